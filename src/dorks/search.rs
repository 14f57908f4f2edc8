use std::{collections::HashMap, sync::Arc, time::Duration};

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use url::Url;

use crate::{
    infrastructure::shutdown::{Shutdown, ShutdownListener},
    net::{rate::jitter, DocumentFetcher, RateGovernor},
};

const SEARCH_ENDPOINT: &str = "https://www.google.com/search";
const PAGE_SIZE: usize = 10;
const TOP_N: usize = 10;

static RESULT_BLOCK: Lazy<Selector> = Lazy::new(|| Selector::parse("div.g").expect("valid selector"));
static RESULT_TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("h3").expect("valid selector"));
static ANY_LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("valid selector"));
static SNIPPET: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("span[data-ved], div.s, div.VwiC3b").expect("valid selector")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub domain: String,
}

pub struct SearchEngine {
    fetcher: Arc<dyn DocumentFetcher>,
    governor: Arc<RateGovernor>,
    bucket: String,
    timeout: Duration,
    page_delay: (Duration, Duration),
}

impl SearchEngine {
    pub fn new(fetcher: Arc<dyn DocumentFetcher>, governor: Arc<RateGovernor>, timeout: Duration) -> Self {
        Self {
            fetcher,
            governor,
            bucket: "google".to_string(),
            timeout,
            page_delay: (Duration::from_secs(2), Duration::from_secs(4)),
        }
    }

    pub fn with_page_delay(mut self, min: Duration, max: Duration) -> Self {
        self.page_delay = (min, max);
        self
    }

    pub async fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        let (_guard, listener) = Shutdown::new();
        self.search_until(query, limit, &listener).await
    }

    /// Collects up to `limit` hits. A failed or empty page, or a stop request, ends the
    /// search with what was gathered so far.
    pub async fn search_until(&self, query: &str, limit: usize, stop: &ShutdownListener) -> Vec<SearchHit> {
        let mut stop = stop.clone();
        let mut hits = Vec::new();
        let mut start = 0;
        while hits.len() < limit {
            if stop.is_triggered() {
                break;
            }
            self.governor.acquire(&self.bucket).await;
            if stop.is_triggered() {
                break;
            }
            let Some(url) = page_url(query, start, PAGE_SIZE.min(limit - hits.len())) else {
                break;
            };

            let page = self.fetcher.fetch(url.as_str(), self.timeout).await;
            if !page.is_success() {
                tracing::warn!(
                    target: "search",
                    query,
                    status = page.status,
                    error = page.error.as_deref().unwrap_or(""),
                    "search page failed"
                );
                break;
            }

            let parsed = parse_results(&page.body);
            if parsed.is_empty() {
                break;
            }
            let remaining = limit - hits.len();
            hits.extend(parsed.into_iter().take(remaining));
            start += PAGE_SIZE;

            if hits.len() < limit && !stop.sleep(jitter(self.page_delay.0, self.page_delay.1)).await {
                break;
            }
        }
        tracing::info!(target: "search", query, hits = hits.len(), "search complete");
        hits
    }

    pub async fn search_file_type(&self, query: &str, file_type: &str, limit: usize) -> Vec<SearchHit> {
        self.search(&super::file_type(query, file_type), limit).await
    }

    pub async fn search_sensitive_info(&self, query: &str, info_type: &str, limit: usize) -> Vec<SearchHit> {
        self.search(&super::build("sensitive_info", info_type, query, &[]), limit)
            .await
    }

    pub async fn search_social_media(&self, query: &str, platform: &str, limit: usize) -> Vec<SearchHit> {
        self.search(&super::social_media(query, platform), limit).await
    }

    pub async fn search_vulnerabilities(&self, query: &str, kind: &str, limit: usize) -> Vec<SearchHit> {
        self.search(&super::build("vulnerabilities", kind, query, &[]), limit)
            .await
    }

    pub async fn search_domain(
        &self,
        domain: &str,
        kind: &str,
        exclude: Option<&str>,
        limit: usize,
    ) -> Vec<SearchHit> {
        self.search(&super::domain(domain, kind, exclude), limit).await
    }
}

fn page_url(query: &str, start: usize, num: usize) -> Option<Url> {
    Url::parse_with_params(
        SEARCH_ENDPOINT,
        &[
            ("q", query.to_string()),
            ("start", start.to_string()),
            ("num", num.to_string()),
            ("hl", "en".to_string()),
            ("lr", "lang_en".to_string()),
        ],
    )
    .ok()
}

pub fn parse_results(html: &str) -> Vec<SearchHit> {
    let document = Html::parse_document(html);
    document
        .select(&RESULT_BLOCK)
        .filter_map(|block| {
            let heading = block.select(&RESULT_TITLE).next()?;
            let href = heading
                .parent()
                .and_then(ElementRef::wrap)
                .filter(|parent| parent.value().name() == "a")
                .and_then(|anchor| anchor.value().attr("href"))
                .or_else(|| block.select(&ANY_LINK).next()?.value().attr("href"))?;
            let url = clean_url(href)?;
            let domain = Url::parse(&url)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string))
                .unwrap_or_default();
            let snippet = block
                .select(&SNIPPET)
                .next()
                .map(|el| collapse(el.text()))
                .unwrap_or_default();
            Some(SearchHit {
                title: collapse(heading.text()),
                url,
                snippet,
                domain,
            })
        })
        .collect()
}

fn clean_url(href: &str) -> Option<String> {
    if href.starts_with("/url?") {
        let redirect = Url::parse(&format!("https://www.google.com{href}")).ok()?;
        return redirect
            .query_pairs()
            .find(|(key, _)| key == "q")
            .map(|(_, value)| value.into_owned())
            .filter(|target| target.starts_with("http"));
    }
    href.starts_with("http").then(|| href.to_string())
}

fn collapse<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HitSummary {
    pub total_results: usize,
    pub unique_domains: usize,
    pub top_domains: Vec<(String, usize)>,
    pub file_types_found: Vec<(String, usize)>,
    pub avg_snippet_length: f64,
}

pub fn summarize_hits(hits: &[SearchHit]) -> HitSummary {
    if hits.is_empty() {
        return HitSummary::default();
    }

    let mut domains: HashMap<&str, usize> = HashMap::new();
    let mut extensions: HashMap<String, usize> = HashMap::new();
    for hit in hits {
        *domains.entry(hit.domain.as_str()).or_default() += 1;
        if let Some(ext) = extension(&hit.url) {
            *extensions.entry(ext).or_default() += 1;
        }
    }

    let snippet_chars: usize = hits.iter().map(|h| h.snippet.chars().count()).sum();
    HitSummary {
        total_results: hits.len(),
        unique_domains: domains.len(),
        top_domains: top(domains.into_iter().map(|(d, n)| (d.to_string(), n))),
        file_types_found: top(extensions.into_iter()),
        avg_snippet_length: snippet_chars as f64 / hits.len() as f64,
    }
}

fn extension(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last = parsed.path_segments()?.last()?;
    let (_, ext) = last.rsplit_once('.')?;
    (!ext.is_empty() && ext.len() <= 4).then(|| ext.to_lowercase())
}

fn top(counts: impl Iterator<Item = (String, usize)>) -> Vec<(String, usize)> {
    let mut ranked: Vec<_> = counts.collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(TOP_N);
    ranked
}
