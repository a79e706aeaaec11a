// src/fetcher/mod.rs
//! Article Fetcher: redirect resolution, download, extraction and content heuristics.

pub mod extract;
pub mod http;

use async_trait::async_trait;

use crate::domain_filter::extract_host;
use crate::error::ArticleError;
use crate::model::PublishedArticle;

pub use http::{BrowserlessResolver, FetcherConfig, HttpArticleFetcher};

#[async_trait]
pub trait ArticleFetcher: Send + Sync {
    /// Real article URL behind an aggregator link, or `None` when it cannot be resolved
    /// to a safe, non-aggregator URL.
    async fn resolve_redirect(&self, url: &str) -> Option<String>;

    async fn fetch_article(&self, url: &str, feed_id: i64)
        -> Result<PublishedArticle, ArticleError>;
}

/// True when `url`'s host is (a subdomain of) one of the aggregator hosts.
pub fn is_redirect_url<S: AsRef<str>>(url: &str, redirect_hosts: &[S]) -> bool {
    let Some(host) = extract_host(url) else {
        return false;
    };
    redirect_hosts.iter().any(|h| {
        let h = h.as_ref().trim().to_ascii_lowercase();
        !h.is_empty() && (host == h || host.ends_with(&format!(".{h}")))
    })
}
