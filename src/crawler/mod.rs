pub mod session;

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use url::Url;

use crate::{
    config::CrawlerConfig,
    domain::{CrawlSummary, ScanResult},
    infrastructure::shutdown::Shutdown,
    net::{DocumentFetcher, RateGovernor, TransportController},
};

pub use session::{CrawlSession, ResultCallback, SharedResults};

pub struct Crawler {
    fetcher: Arc<dyn DocumentFetcher>,
    transport: Arc<dyn TransportController>,
    config: CrawlerConfig,
    governor: Option<(Arc<RateGovernor>, String)>,
    running: Arc<AtomicBool>,
    stop: Mutex<Option<Shutdown>>,
    results: SharedResults,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Crawler {
    pub fn new(
        fetcher: Arc<dyn DocumentFetcher>,
        transport: Arc<dyn TransportController>,
        config: CrawlerConfig,
    ) -> Self {
        Self {
            fetcher,
            transport,
            config,
            governor: None,
            running: Arc::new(AtomicBool::new(false)),
            stop: Mutex::new(None),
            results: SharedResults::default(),
            handle: Mutex::new(None),
        }
    }

    pub fn with_governor(mut self, governor: Arc<RateGovernor>, bucket: impl Into<String>) -> Self {
        self.governor = Some((governor, bucket.into()));
        self
    }

    /// Accepts a crawl over `seeds`. Returns `false` if a crawl is already running or the
    /// transport cannot be brought up.
    pub async fn start(&self, seeds: Vec<String>, on_result: Option<ResultCallback>) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!(target: "crawler", "crawl already running; start rejected");
            return false;
        }

        if !self.transport.ensure_started().await {
            tracing::error!(target: "crawler", "transport unreachable; crawl not started");
            self.running.store(false, Ordering::SeqCst);
            return false;
        }

        self.results.lock().clear();
        let (shutdown, listener) = Shutdown::new();
        *self.stop.lock() = Some(shutdown);

        let mut session =
            CrawlSession::new(self.config.clone(), &seeds, self.results.clone(), listener);
        if let Some((governor, bucket)) = &self.governor {
            session = session.with_governor(governor.clone(), bucket.clone());
        }

        let fetcher = self.fetcher.clone();
        let running = self.running.clone();
        let seed_count = seeds.len();
        let handle = tokio::spawn(async move {
            tracing::info!(target: "crawler", seeds = seed_count, "crawl started");
            let fetched = session.run(fetcher.as_ref(), on_result.as_ref()).await;
            running.store(false, Ordering::SeqCst);
            tracing::info!(target: "crawler", fetched, "crawl finished");
        });
        *self.handle.lock() = Some(handle);
        true
    }

    pub fn stop(&self) {
        if let Some(shutdown) = self.stop.lock().as_ref() {
            shutdown.trigger();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn wait(&self) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                if err.is_panic() {
                    tracing::error!(target: "crawler", "crawl task panicked");
                    self.running.store(false, Ordering::SeqCst);
                }
            }
        }
    }

    pub fn results(&self) -> Vec<ScanResult> {
        self.results.lock().clone()
    }

    pub fn summary(&self) -> CrawlSummary {
        summarize(&self.results.lock())
    }

    pub fn export_json(&self) -> Result<String> {
        export_json(&self.results.lock())
    }
}

pub fn summarize(results: &[ScanResult]) -> CrawlSummary {
    let successful = results.iter().filter(|r| r.is_success()).count();
    let domains: HashSet<String> = results.iter().filter_map(|r| authority(&r.url)).collect();
    CrawlSummary {
        total: results.len(),
        successful,
        failed: results.len() - successful,
        total_links: results.iter().map(|r| r.links.len()).sum(),
        total_emails: results.iter().map(|r| r.emails.len()).sum(),
        total_forms: results.iter().map(|r| r.forms.len()).sum(),
        unique_domains: domains.len(),
    }
}

fn authority(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    url: &'a str,
    title: &'a str,
    status: u16,
    links_count: usize,
    emails_count: usize,
    forms_count: usize,
    timestamp: DateTime<Utc>,
    error: Option<&'a str>,
}

pub fn export_json(results: &[ScanResult]) -> Result<String> {
    let rows: Vec<ExportRow<'_>> = results
        .iter()
        .map(|r| ExportRow {
            url: &r.url,
            title: &r.title,
            status: r.status,
            links_count: r.links.len(),
            emails_count: r.emails.len(),
            forms_count: r.forms.len(),
            timestamp: r.timestamp,
            error: r.error.as_deref(),
        })
        .collect();
    Ok(serde_json::to_string_pretty(&rows)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(url: &str, status: u16, links: usize) -> ScanResult {
        ScanResult {
            url: url.into(),
            depth: 0,
            title: "t".into(),
            content: String::new(),
            links: (0..links).map(|i| format!("http://l{i}.onion/")).collect(),
            forms: vec![],
            emails: vec!["a@b.cd".into()],
            status,
            error: (status == 0).then(|| "connection failed".to_string()),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn summary_counts_outcomes_and_domains() {
        let results = vec![
            result("http://a.onion/", 200, 2),
            result("http://a.onion/x", 200, 1),
            result("http://a.onion:8080/", 404, 0),
            result("http://b.onion/", 0, 0),
        ];
        let summary = summarize(&results);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.successful, 2);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.total_links, 3);
        assert_eq!(summary.total_emails, 4);
        assert_eq!(summary.unique_domains, 3);
    }

    #[test]
    fn empty_summary_is_zeroed() {
        assert_eq!(summarize(&[]), CrawlSummary::default());
    }

    #[test]
    fn export_lists_counts_per_result() {
        let json = export_json(&[result("http://b.onion/", 0, 0)]).unwrap();
        let rows: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(rows[0]["url"], "http://b.onion/");
        assert_eq!(rows[0]["status"], 0);
        assert_eq!(rows[0]["emails_count"], 1);
        assert_eq!(rows[0]["error"], "connection failed");
    }
}
