use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub tor: TorConfig,
    pub crawler: CrawlerConfig,
    pub monitor: MonitorConfig,
    pub rate: RateConfig,
    pub search: SearchConfig,
    pub directories: DirectoryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone)]
pub struct TorConfig {
    pub socks_host: String,
    pub socks_port: u16,
    pub control_port: u16,
    pub control_password: Option<String>,
    pub binary: Option<String>,
    pub rotate_settle: Duration,
}

impl TorConfig {
    pub fn proxy_url(&self) -> String {
        format!("socks5h://{}:{}", self.socks_host, self.socks_port)
    }
}

impl Default for TorConfig {
    fn default() -> Self {
        Self {
            socks_host: "127.0.0.1".to_string(),
            socks_port: 9050,
            control_port: 9051,
            control_password: None,
            binary: None,
            rotate_settle: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    pub max_depth: usize,
    pub fetch_timeout: Duration,
    pub content_max_chars: usize,
    pub delay_min: Duration,
    pub delay_max: Duration,
    pub address_suffix: String,
    pub seeds: Vec<String>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            fetch_timeout: Duration::from_secs(60),
            content_max_chars: 5_000,
            delay_min: Duration::from_millis(1_000),
            delay_max: Duration::from_millis(3_000),
            address_suffix: ".onion".to_string(),
            seeds: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    pub error_backoff: Duration,
    pub dispatch_delay: Duration,
    pub stop_timeout: Duration,
    pub alert_capacity: usize,
    pub dedup_capacity: usize,
    pub keywords: Vec<String>,
    pub template: Option<String>,
    pub sources: Vec<String>,
    pub frequency_minutes: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            error_backoff: Duration::from_secs(60),
            dispatch_delay: Duration::from_secs(2),
            stop_timeout: Duration::from_secs(5),
            alert_capacity: 1_000,
            dedup_capacity: 10_000,
            keywords: Vec::new(),
            template: None,
            sources: Vec::new(),
            frequency_minutes: 60,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateConfig {
    pub google_per_minute: u32,
    pub darkweb_per_minute: u32,
    pub crawler_per_minute: u32,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            google_per_minute: 10,
            darkweb_per_minute: 5,
            crawler_per_minute: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub results_per_query: usize,
    pub request_timeout: Duration,
    pub darkweb_seeds: Vec<String>,
}

pub const DEFAULT_DARKWEB_SEED: &str =
    "http://juhanurmihxlp77nkq76byazcldy2hlmovfu2epvl5ankdibsot4csyd.onion/search/?q={query}";

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            results_per_query: 10,
            request_timeout: Duration::from_secs(15),
            darkweb_seeds: vec![DEFAULT_DARKWEB_SEED.to_string()],
        }
    }
}

#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub logs_dir: String,
    pub data_dir: String,
    pub db_filename: String,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),
    #[error("CRAWL_DELAY_MIN_MS must not exceed CRAWL_DELAY_MAX_MS")]
    DelayRange,
}
