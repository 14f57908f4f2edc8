use std::{env, str::FromStr, time::Duration};

use super::env::{
    AppConfig, ConfigError, CrawlerConfig, DirectoryConfig, LoggingConfig, MonitorConfig,
    RateConfig, SearchConfig, TorConfig,
};

pub fn load_config() -> Result<AppConfig, ConfigError> {
    AppConfig::from_env()
}

impl AppConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let tor_defaults = TorConfig::default();
        let tor = TorConfig {
            socks_host: env::var("TOR_SOCKS_HOST").unwrap_or(tor_defaults.socks_host),
            socks_port: parse_or("TOR_SOCKS_PORT", tor_defaults.socks_port)?,
            control_port: parse_or("TOR_CONTROL_PORT", tor_defaults.control_port)?,
            control_password: non_empty("TOR_CONTROL_PASSWORD"),
            binary: non_empty("TOR_BINARY"),
            rotate_settle: Duration::from_secs(parse_or("TOR_ROTATE_SETTLE_SECS", 5)?),
        };

        let crawler_defaults = CrawlerConfig::default();
        let crawler = CrawlerConfig {
            max_depth: parse_or("CRAWL_MAX_DEPTH", crawler_defaults.max_depth)?,
            fetch_timeout: Duration::from_secs(positive("CRAWL_TIMEOUT_SECS", 60)?),
            content_max_chars: positive("CRAWL_CONTENT_MAX_CHARS", 5_000)?,
            delay_min: Duration::from_millis(parse_or("CRAWL_DELAY_MIN_MS", 1_000)?),
            delay_max: Duration::from_millis(parse_or("CRAWL_DELAY_MAX_MS", 3_000)?),
            address_suffix: env::var("CRAWL_ADDRESS_SUFFIX")
                .unwrap_or(crawler_defaults.address_suffix),
            seeds: split_list("CRAWL_SEEDS", ','),
        };
        if crawler.delay_min > crawler.delay_max {
            return Err(ConfigError::DelayRange);
        }

        let monitor = MonitorConfig {
            poll_interval: Duration::from_secs(positive("MONITOR_POLL_SECS", 30)?),
            error_backoff: Duration::from_secs(positive("MONITOR_ERROR_BACKOFF_SECS", 60)?),
            dispatch_delay: Duration::from_secs(parse_or("MONITOR_DISPATCH_DELAY_SECS", 2)?),
            stop_timeout: Duration::from_secs(positive("MONITOR_STOP_TIMEOUT_SECS", 5)?),
            alert_capacity: positive("ALERT_BUFFER_CAPACITY", 1_000)?,
            dedup_capacity: positive("DEDUP_CAPACITY", 10_000)?,
            keywords: split_list("MONITOR_KEYWORDS", ','),
            template: non_empty("MONITOR_TEMPLATE"),
            sources: split_list("MONITOR_SOURCES", ','),
            frequency_minutes: positive("MONITOR_FREQUENCY_MINUTES", 60)?,
        };

        let rate = RateConfig {
            google_per_minute: positive("RATE_GOOGLE_PER_MINUTE", 10)?,
            darkweb_per_minute: positive("RATE_DARKWEB_PER_MINUTE", 5)?,
            crawler_per_minute: positive("RATE_CRAWLER_PER_MINUTE", 30)?,
        };

        let search_defaults = SearchConfig::default();
        let darkweb_seeds = split_list("DARKWEB_SEARCH_SEEDS", ',');
        let search = SearchConfig {
            results_per_query: positive("SEARCH_RESULTS_PER_QUERY", 10)?,
            request_timeout: Duration::from_secs(positive("SEARCH_TIMEOUT_SECS", 15)?),
            darkweb_seeds: if darkweb_seeds.is_empty() {
                search_defaults.darkweb_seeds
            } else {
                darkweb_seeds
            },
        };

        let directories = DirectoryConfig {
            logs_dir: env::var("LOGS_DIR").unwrap_or_else(|_| "logs".to_string()),
            data_dir: env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()),
            db_filename: env::var("DB_FILENAME").unwrap_or_else(|_| "darkwatch.db".to_string()),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        };

        Ok(Self {
            tor,
            crawler,
            monitor,
            rate,
            search,
            directories,
            logging,
        })
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match non_empty(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

fn positive<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
{
    let value = parse_or(key, default)?;
    if value <= T::default() {
        return Err(ConfigError::NotPositive(key));
    }
    Ok(value)
}

fn split_list(key: &str, separator: char) -> Vec<String> {
    env::var(key)
        .map(|value| {
            value
                .split(separator)
                .map(|part| part.trim().to_string())
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default()
}
