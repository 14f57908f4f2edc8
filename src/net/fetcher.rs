use std::time::Duration;

use anyhow::{Context, Result};
use futures::{future::BoxFuture, FutureExt};
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE},
    Client, Proxy,
};

use crate::{config::TorConfig, domain::FetchResult};

const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; rv:109.0) Gecko/20100101 Firefox/115.0";

/// Retrieves one document. Implementations never fail: every transport problem is folded
/// into the returned `FetchResult`.
pub trait DocumentFetcher: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str, timeout: Duration) -> BoxFuture<'a, FetchResult>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FailureKind {
    Timeout,
    Connection,
    Redirect,
    Body,
    Other,
}

impl FailureKind {
    fn classify(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            FailureKind::Timeout
        } else if err.is_connect() {
            FailureKind::Connection
        } else if err.is_redirect() {
            FailureKind::Redirect
        } else if err.is_body() || err.is_decode() {
            FailureKind::Body
        } else {
            FailureKind::Other
        }
    }

    fn label(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "request timed out",
            FailureKind::Connection => "connection failed",
            FailureKind::Redirect => "too many redirects",
            FailureKind::Body => "failed to read response body",
            FailureKind::Other => "request error",
        }
    }
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    via_proxy: bool,
}

impl HttpFetcher {
    /// Client whose every request, including DNS resolution, goes through the SOCKS proxy.
    pub fn tor(config: &TorConfig) -> Result<Self> {
        let proxy = Proxy::all(config.proxy_url())
            .with_context(|| format!("invalid proxy url {}", config.proxy_url()))?;
        let client = base_builder().proxy(proxy).build()?;
        Ok(Self {
            client,
            via_proxy: true,
        })
    }

    pub fn direct() -> Result<Self> {
        let client = base_builder().build()?;
        Ok(Self {
            client,
            via_proxy: false,
        })
    }

    async fn get(&self, url: &str, timeout: Duration) -> FetchResult {
        let response = match self.client.get(url).timeout(timeout).send().await {
            Ok(response) => response,
            Err(err) => return self.failure(url, &err),
        };
        let status = response.status().as_u16();
        match response.text().await {
            Ok(body) => {
                tracing::debug!(target: "fetch", url, status, bytes = body.len(), "fetched");
                FetchResult::ok(status, body)
            }
            Err(err) => self.failure(url, &err),
        }
    }

    fn failure(&self, url: &str, err: &reqwest::Error) -> FetchResult {
        let kind = FailureKind::classify(err);
        tracing::debug!(
            target: "fetch",
            url,
            via_proxy = self.via_proxy,
            kind = kind.label(),
            error = %err,
            "fetch failed"
        );
        FetchResult::failed(format!("{}: {}", kind.label(), err))
    }
}

impl DocumentFetcher for HttpFetcher {
    fn fetch<'a>(&'a self, url: &'a str, timeout: Duration) -> BoxFuture<'a, FetchResult> {
        self.get(url, timeout).boxed()
    }
}

fn base_builder() -> reqwest::ClientBuilder {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
    Client::builder()
        .user_agent(BROWSER_USER_AGENT)
        .default_headers(headers)
        .connect_timeout(Duration::from_secs(30))
}
