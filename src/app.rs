use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::time::timeout;

use crate::{
    analysis::classify_result,
    config::{AppConfig, MonitorConfig},
    crawler::{Crawler, ResultCallback},
    db::{self, AlertRepository},
    domain::{Alert, MonitoringRule, ScanResult, Severity, Source},
    dorks::SearchEngine,
    infrastructure::{directories::ResolvedPaths, shutdown::Shutdown},
    monitor::{create_rule_from_template, AlertCallback, Scheduler, SourceRouter},
    net::{HttpFetcher, RateGovernor, TorTransport, TransportController},
};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
const CONFIGURED_RULE_ID: &str = "configured";

pub struct DarkwatchApp {
    paths: ResolvedPaths,
    config: Arc<AppConfig>,
    transport: Arc<TorTransport>,
    crawler: Crawler,
    scheduler: Scheduler,
    alerts: Arc<AlertRepository>,
    shutdown: Shutdown,
}

impl DarkwatchApp {
    pub async fn initialize(config: AppConfig, paths: ResolvedPaths, shutdown: Shutdown) -> Result<Self> {
        let config = Arc::new(config);
        let pool = db::init_pool(&paths.db_path).await?;
        let alerts = Arc::new(AlertRepository::new(pool));

        let transport = Arc::new(TorTransport::new(config.tor.clone()));
        let onion_fetcher = Arc::new(HttpFetcher::tor(&config.tor)?);
        let clearnet_fetcher = Arc::new(HttpFetcher::direct()?);

        let governor = Arc::new(
            RateGovernor::new(config.rate.google_per_minute)
                .with_budget(Source::Google.rate_bucket(), config.rate.google_per_minute)
                .with_budget(Source::Darkweb.rate_bucket(), config.rate.darkweb_per_minute)
                .with_budget("crawler", config.rate.crawler_per_minute),
        );

        let crawler = Crawler::new(onion_fetcher.clone(), transport.clone(), config.crawler.clone())
            .with_governor(governor.clone(), "crawler");

        let engine = SearchEngine::new(clearnet_fetcher, governor.clone(), config.search.request_timeout);
        let router = SourceRouter::new(
            engine,
            onion_fetcher,
            config.search.darkweb_seeds.clone(),
            config.crawler.clone(),
            governor,
            config.search.results_per_query,
        );

        let scheduler = Scheduler::new(Arc::new(router), config.monitor.clone()).with_sink(alerts.clone());
        let known = alerts
            .load_fingerprints(config.monitor.dedup_capacity)
            .await
            .context("failed to load seen hits")?;
        tracing::info!(target: "app", fingerprints = known.len(), "dedup state restored");
        scheduler.preload_seen(known);

        for rule in configured_rules(&config.monitor)? {
            scheduler.add_rule(rule)?;
        }
        scheduler.on_alert(alert_logger());

        Ok(Self {
            paths,
            config,
            transport,
            crawler,
            scheduler,
            alerts,
            shutdown,
        })
    }

    pub async fn run(self) -> Result<()> {
        let DarkwatchApp {
            paths,
            config,
            transport,
            crawler,
            scheduler,
            alerts,
            shutdown,
        } = self;

        tracing::info!(target: "app", version = env!("CARGO_PKG_VERSION"), "darkwatch starting");
        let status = transport.status().await;
        tracing::info!(
            target: "app",
            reachable = status.reachable,
            controller = status.controller_ok,
            is_tor = ?status.is_tor,
            "transport status"
        );

        let mut crawling = false;
        if !config.crawler.seeds.is_empty() {
            if status.controller_ok && !transport.rotate_identity().await {
                tracing::warn!(target: "app", "continuing with the current circuit");
            }
            crawling = crawler
                .start(config.crawler.seeds.clone(), Some(result_logger()))
                .await;
        }
        let monitoring = !scheduler.rules().is_empty() && scheduler.start();

        let mut shutdown_listener = shutdown.subscribe();
        if monitoring {
            shutdown_listener.notified().await;
            tracing::info!(target: "app", "shutdown signal received");
        } else if crawling {
            tokio::select! {
                _ = shutdown_listener.notified() => {
                    tracing::info!(target: "app", "shutdown signal received");
                }
                _ = crawler.wait() => {
                    tracing::info!(target: "app", "crawl complete");
                }
            }
        } else {
            tracing::warn!(target: "app", "no crawl seeds or monitoring keywords configured; nothing to do");
        }

        shutdown.trigger();
        crawler.stop();
        if timeout(SHUTDOWN_TIMEOUT, crawler.wait()).await.is_err() {
            tracing::warn!(target: "crawler", "crawl did not stop within {:?}", SHUTDOWN_TIMEOUT);
        }
        scheduler.stop().await;

        if let Err(err) = write_exports(&paths, &crawler, &scheduler).await {
            tracing::error!(target: "app", error = %format!("{err:#}"), "export failed");
        }

        transport.shutdown().await;
        if timeout(SHUTDOWN_TIMEOUT, alerts.close()).await.is_err() {
            tracing::warn!(target: "db", "alert store did not close within {:?}", SHUTDOWN_TIMEOUT);
        }

        tracing::info!(target: "app", "darkwatch stopped");
        Ok(())
    }
}

fn configured_rules(monitor: &MonitorConfig) -> Result<Vec<MonitoringRule>> {
    if monitor.keywords.is_empty() {
        return Ok(Vec::new());
    }
    let rule = match &monitor.template {
        Some(template) => create_rule_from_template(template, monitor.keywords.clone(), Utc::now())?,
        None => {
            let sources = if monitor.sources.is_empty() {
                vec![Source::Google]
            } else {
                monitor
                    .sources
                    .iter()
                    .map(|name| name.parse::<Source>())
                    .collect::<Result<Vec<_>, _>>()?
            };
            MonitoringRule::new(
                CONFIGURED_RULE_ID,
                monitor.keywords.clone(),
                sources,
                monitor.frequency_minutes,
            )?
        }
    };
    // First poll runs the rule immediately instead of one cadence from now.
    let cadence = rule.cadence();
    Ok(vec![rule.with_last_run(Utc::now() - cadence)])
}

fn result_logger() -> ResultCallback {
    Arc::new(|result: &ScanResult| {
        if !result.is_success() {
            return;
        }
        let report = classify_result(result);
        let class = &report.classification;
        tracing::info!(
            target: "crawler",
            url = %result.url,
            marketplace = class.potential_marketplace,
            login_form = class.has_login_form,
            registration_form = class.has_registration_form,
            keywords = ?class.keywords_found,
            suspicious = ?class.suspicious_indicators,
            emails = report.email_count,
            "page classified"
        );
    })
}

fn alert_logger() -> AlertCallback {
    Arc::new(|alert: &Alert| {
        if alert.severity >= Severity::High {
            tracing::warn!(
                target: "alert",
                keyword = %alert.keyword,
                source = %alert.source,
                url = %alert.url,
                severity = %alert.severity,
                "high-severity alert"
            );
        }
    })
}

async fn write_exports(paths: &ResolvedPaths, crawler: &Crawler, scheduler: &Scheduler) -> Result<()> {
    let summary = crawler.summary();
    if summary.total > 0 {
        tracing::info!(
            target: "app",
            total = summary.total,
            successful = summary.successful,
            failed = summary.failed,
            domains = summary.unique_domains,
            "crawl summary"
        );
        let path = paths.export_path("crawl");
        tokio::fs::write(&path, crawler.export_json()?)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!(target: "app", path = %path.display(), "crawl results exported");
    }

    let stats = scheduler.statistics();
    if stats.buffered_alerts > 0 {
        let path = paths.export_path("alerts");
        tokio::fs::write(&path, scheduler.export_alerts_json(24 * 7)?)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!(target: "app", path = %path.display(), alerts = stats.buffered_alerts, "alerts exported");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_keywords_means_no_rules() {
        assert!(configured_rules(&MonitorConfig::default()).unwrap().is_empty());
    }

    #[test]
    fn configured_rule_is_due_immediately() {
        let monitor = MonitorConfig {
            keywords: vec!["acme".into()],
            sources: vec!["darkweb".into(), "paste_sites".into()],
            frequency_minutes: 15,
            ..MonitorConfig::default()
        };
        let rules = configured_rules(&monitor).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id, CONFIGURED_RULE_ID);
        assert_eq!(rules[0].sources, vec![Source::Darkweb, Source::PasteSites]);
        assert!(rules[0].is_due(Utc::now()));
    }

    #[test]
    fn template_and_source_errors_surface() {
        let unknown_template = MonitorConfig {
            keywords: vec!["acme".into()],
            template: Some("nope".into()),
            ..MonitorConfig::default()
        };
        assert!(configured_rules(&unknown_template).is_err());

        let unknown_source = MonitorConfig {
            keywords: vec!["acme".into()],
            sources: vec!["irc".into()],
            ..MonitorConfig::default()
        };
        assert!(configured_rules(&unknown_source).is_err());
    }
}
