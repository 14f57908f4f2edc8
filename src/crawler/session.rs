use std::{collections::HashSet, sync::Arc};

use chrono::Utc;
use parking_lot::Mutex;
use url::Url;

use crate::{
    analysis::analyze,
    config::CrawlerConfig,
    domain::ScanResult,
    infrastructure::shutdown::ShutdownListener,
    net::{rate::jitter, DocumentFetcher, RateGovernor},
};

pub type ResultCallback = Arc<dyn Fn(&ScanResult) + Send + Sync>;
pub type SharedResults = Arc<Mutex<Vec<ScanResult>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
struct FrontierEntry {
    url: String,
    depth: usize,
    // Seeds skip the courtesy delay.
    discovered: bool,
}

pub struct CrawlSession {
    config: CrawlerConfig,
    frontier: Vec<FrontierEntry>,
    visited: HashSet<String>,
    results: SharedResults,
    stop: ShutdownListener,
    governor: Option<(Arc<RateGovernor>, String)>,
}

impl CrawlSession {
    pub fn new(
        config: CrawlerConfig,
        seeds: &[String],
        results: SharedResults,
        stop: ShutdownListener,
    ) -> Self {
        let frontier = seeds
            .iter()
            .rev()
            .map(|seed| FrontierEntry {
                url: normalize(seed.trim()),
                depth: 0,
                discovered: false,
            })
            .filter(|entry| !entry.url.is_empty())
            .collect();
        Self {
            config,
            frontier,
            visited: HashSet::new(),
            results,
            stop,
            governor: None,
        }
    }

    pub fn with_governor(mut self, governor: Arc<RateGovernor>, bucket: impl Into<String>) -> Self {
        self.governor = Some((governor, bucket.into()));
        self
    }

    pub async fn run(
        mut self,
        fetcher: &dyn DocumentFetcher,
        on_result: Option<&ResultCallback>,
    ) -> usize {
        let mut fetched = 0;
        while let Some(entry) = self.frontier.pop() {
            if self.stop.is_triggered() {
                tracing::info!(target: "crawler", pending = self.frontier.len() + 1, "crawl stopped");
                break;
            }
            if entry.depth > self.config.max_depth || self.visited.contains(&entry.url) {
                continue;
            }
            if entry.discovered {
                let delay = jitter(self.config.delay_min, self.config.delay_max);
                if !self.stop.sleep(delay).await || self.stop.is_triggered() {
                    tracing::info!(target: "crawler", "crawl stopped during delay");
                    break;
                }
            }
            if let Some((governor, bucket)) = &self.governor {
                governor.acquire(bucket).await;
                if self.stop.is_triggered() {
                    break;
                }
            }

            self.visited.insert(entry.url.clone());
            let result = self.scan(fetcher, &entry.url, entry.depth).await;
            fetched += 1;

            if result.is_success() && entry.depth < self.config.max_depth {
                // Reversed so siblings pop in document order.
                for link in result.links.iter().rev() {
                    if !self.visited.contains(link) {
                        self.frontier.push(FrontierEntry {
                            url: link.clone(),
                            depth: entry.depth + 1,
                            discovered: true,
                        });
                    }
                }
            }

            self.results.lock().push(result.clone());
            if let Some(callback) = on_result {
                callback(&result);
            }
        }
        fetched
    }

    async fn scan(&self, fetcher: &dyn DocumentFetcher, url: &str, depth: usize) -> ScanResult {
        let fetched = fetcher.fetch(url, self.config.fetch_timeout).await;
        let mut result = ScanResult {
            url: url.to_string(),
            depth,
            title: String::new(),
            content: String::new(),
            links: Vec::new(),
            forms: Vec::new(),
            emails: Vec::new(),
            status: fetched.status,
            error: fetched.error,
            timestamp: Utc::now(),
        };
        if result.is_success() {
            let page = analyze(
                &fetched.body,
                url,
                &self.config.address_suffix,
                self.config.content_max_chars,
            );
            result.title = page.title;
            result.content = page.text;
            result.links = page.links;
            result.forms = page.forms;
            result.emails = page.emails;
        }
        match &result.error {
            Some(error) => {
                tracing::warn!(target: "crawler", url, depth, error = %error, "scan failed")
            }
            None => tracing::info!(
                target: "crawler",
                url,
                depth,
                status = result.status,
                links = result.links.len(),
                "scanned"
            ),
        }
        result
    }
}

fn normalize(url: &str) -> String {
    Url::parse(url)
        .map(|parsed| parsed.to_string())
        .unwrap_or_else(|_| url.to_string())
}
