use std::{collections::BTreeMap, sync::Arc};

use anyhow::{Context, Result};
use futures::{future::BoxFuture, FutureExt};
use url::form_urlencoded;

use crate::{
    config::CrawlerConfig,
    crawler::{CrawlSession, SharedResults},
    domain::{RawHit, Source},
    dorks::{self, SearchEngine, SearchHit},
    infrastructure::shutdown::ShutdownListener,
    net::{DocumentFetcher, RateGovernor},
};

const SOCIAL_PLATFORMS: &[&str] = &["twitter", "facebook", "linkedin", "instagram"];
const PASTE_SITES: &[&str] = &["pastebin.com", "paste.org", "hastebin.com"];
const PER_SITE_RESULTS: usize = 5;

/// Answers one (keyword, source) query with raw, unscored hits. Implementations return
/// early with what they have once `stop` fires.
pub trait HitSource: Send + Sync {
    fn search<'a>(
        &'a self,
        source: Source,
        keyword: &'a str,
        filters: &'a BTreeMap<String, String>,
        stop: &'a ShutdownListener,
    ) -> BoxFuture<'a, Result<Vec<RawHit>>>;
}

pub struct SourceRouter {
    engine: SearchEngine,
    darkweb_fetcher: Arc<dyn DocumentFetcher>,
    darkweb_seeds: Vec<String>,
    crawler: CrawlerConfig,
    governor: Arc<RateGovernor>,
    results_per_query: usize,
}

impl SourceRouter {
    pub fn new(
        engine: SearchEngine,
        darkweb_fetcher: Arc<dyn DocumentFetcher>,
        darkweb_seeds: Vec<String>,
        crawler: CrawlerConfig,
        governor: Arc<RateGovernor>,
        results_per_query: usize,
    ) -> Self {
        Self {
            engine,
            darkweb_fetcher,
            darkweb_seeds,
            crawler,
            governor,
            results_per_query,
        }
    }

    async fn google(
        &self,
        keyword: &str,
        filters: &BTreeMap<String, String>,
        stop: &ShutdownListener,
    ) -> Vec<RawHit> {
        let query = google_query(keyword, filters);
        let hits = self
            .engine
            .search_until(&query, self.results_per_query, stop)
            .await;
        into_raw("google", hits)
    }

    async fn social_media(&self, keyword: &str, stop: &ShutdownListener) -> Vec<RawHit> {
        let mut raw = Vec::new();
        for platform in SOCIAL_PLATFORMS {
            let query = dorks::social_media(keyword, platform);
            let hits = self.engine.search_until(&query, PER_SITE_RESULTS, stop).await;
            raw.extend(into_raw(&format!("social_media_{platform}.com"), hits));
        }
        raw
    }

    async fn paste_sites(&self, keyword: &str, stop: &ShutdownListener) -> Vec<RawHit> {
        let mut raw = Vec::new();
        for site in PASTE_SITES {
            let query = format!("site:{site} \"{keyword}\"");
            let hits = self.engine.search_until(&query, PER_SITE_RESULTS, stop).await;
            raw.extend(into_raw(&format!("paste_{site}"), hits));
        }
        raw
    }

    async fn darkweb(
        &self,
        keyword: &str,
        filters: &BTreeMap<String, String>,
        stop: &ShutdownListener,
    ) -> Result<Vec<RawHit>> {
        let depth = match filters.get("depth") {
            Some(value) => value
                .trim()
                .parse::<usize>()
                .with_context(|| format!("invalid depth filter: {value}"))?,
            None => 0,
        };
        let seeds = darkweb_seeds(&self.darkweb_seeds, keyword);
        let config = CrawlerConfig {
            max_depth: depth,
            ..self.crawler.clone()
        };

        let results = SharedResults::default();
        let session = CrawlSession::new(config, &seeds, results.clone(), stop.clone())
            .with_governor(self.governor.clone(), Source::Darkweb.rate_bucket());
        session.run(self.darkweb_fetcher.as_ref(), None).await;

        let needle = keyword.to_lowercase();
        let hits: Vec<RawHit> = results
            .lock()
            .iter()
            .filter(|page| page.is_success())
            .filter(|page| {
                page.content.to_lowercase().contains(&needle)
                    || page.title.to_lowercase().contains(&needle)
            })
            .map(|page| RawHit {
                source: Source::Darkweb.as_str().to_string(),
                url: page.url.clone(),
                title: page.title.clone(),
                content: page.content.clone(),
            })
            .collect();
        Ok(hits)
    }
}

impl HitSource for SourceRouter {
    fn search<'a>(
        &'a self,
        source: Source,
        keyword: &'a str,
        filters: &'a BTreeMap<String, String>,
        stop: &'a ShutdownListener,
    ) -> BoxFuture<'a, Result<Vec<RawHit>>> {
        async move {
            let hits = match source {
                Source::Google => self.google(keyword, filters, stop).await,
                Source::SocialMedia => self.social_media(keyword, stop).await,
                Source::PasteSites => self.paste_sites(keyword, stop).await,
                Source::Darkweb => self.darkweb(keyword, filters, stop).await?,
            };
            tracing::debug!(target: "monitor", source = %source, keyword, hits = hits.len(), "source searched");
            Ok(hits)
        }
        .boxed()
    }
}

pub fn google_query(keyword: &str, filters: &BTreeMap<String, String>) -> String {
    let mut query = keyword.to_string();
    if let Some(range) = filters.get("date_range") {
        query.push_str(&format!(" after:{range}"));
    }
    if let Some(site) = filters.get("site") {
        query.push_str(&format!(" site:{site}"));
    }
    query
}

fn darkweb_seeds(templates: &[String], keyword: &str) -> Vec<String> {
    let encoded: String = form_urlencoded::byte_serialize(keyword.as_bytes()).collect();
    templates
        .iter()
        .map(|template| template.replace("{query}", &encoded))
        .collect()
}

fn into_raw(source: &str, hits: Vec<SearchHit>) -> Vec<RawHit> {
    hits.into_iter()
        .map(|hit| RawHit {
            source: source.to_string(),
            url: hit.url,
            title: hit.title,
            content: hit.snippet,
        })
        .collect()
}
