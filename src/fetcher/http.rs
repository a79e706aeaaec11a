// src/fetcher/http.rs
//! reqwest-backed fetcher with optional Browserless redirect resolution.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, UPGRADE_INSECURE_REQUESTS};
use reqwest::redirect::Policy;
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use super::extract::{extract, find_paywall_phrase, summarize, word_count};
use super::{is_redirect_url, ArticleFetcher};
use crate::config::{DomainLists, Settings};
use crate::error::ArticleError;
use crate::model::PublishedArticle;
use crate::url_safety::{validate_url, validate_url_offline};

const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
const MAX_REDIRECTS: usize = 10;

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub min_word_count: usize,
    pub summary_chars: usize,
    pub paywall_phrases: Vec<String>,
    pub redirect_hosts: Vec<String>,
    pub redirect_timeout: Duration,
    pub page_load_timeout: Duration,
    pub fetch_timeout: Duration,
}

impl FetcherConfig {
    pub fn from_settings(s: &Settings, lists: &DomainLists) -> Self {
        Self {
            min_word_count: s.min_article_word_count,
            summary_chars: s.summary_chars,
            paywall_phrases: lists.paywall_phrases.clone(),
            redirect_hosts: s.redirect_hosts.clone(),
            redirect_timeout: Duration::from_secs(s.redirect_timeout_secs),
            page_load_timeout: Duration::from_secs(s.page_load_timeout_secs),
            fetch_timeout: Duration::from_secs(s.fetch_timeout_secs),
        }
    }
}

// ------------------------------------------------------------
// Browserless (/function) redirect resolution
// ------------------------------------------------------------

const RESOLVE_SCRIPT: &str = r#"export default async function ({ page, context }) {
  await page.goto(context.url, { waitUntil: "domcontentloaded", timeout: context.pageLoadMs });
  await new Promise((r) => setTimeout(r, context.waitMs));
  return { data: { url: page.url() }, type: "application/json" };
}"#;

#[derive(Deserialize)]
struct ResolvedUrl {
    url: String,
}

/// Loads a URL in a remote headless browser and reports where it ended up.
pub struct BrowserlessResolver {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl BrowserlessResolver {
    pub fn new(base_url: &str, token: Option<&str>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        }
    }

    /// `BROWSERLESS_URL` (+ optional `BROWSERLESS_TOKEN`), or `None` when unset.
    pub fn from_env() -> Option<Self> {
        let base = std::env::var("BROWSERLESS_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())?;
        let token = std::env::var("BROWSERLESS_TOKEN")
            .ok()
            .filter(|v| !v.trim().is_empty());
        Some(Self::new(&base, token.as_deref()))
    }

    async fn final_url(
        &self,
        url: &str,
        wait: Duration,
        page_load: Duration,
    ) -> Result<String, String> {
        let mut endpoint = format!("{}/function", self.base_url);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={token}"));
        }
        let body = serde_json::json!({
            "code": RESOLVE_SCRIPT,
            "context": {
                "url": url,
                "waitMs": wait.as_millis() as u64,
                "pageLoadMs": page_load.as_millis() as u64,
            }
        });
        let resp = self
            .client
            .post(&endpoint)
            .timeout(wait + page_load + Duration::from_secs(5))
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(format!("browserless HTTP {status}: {message}"));
        }
        let out: ResolvedUrl = resp.json().await.map_err(|e| e.to_string())?;
        Ok(out.url)
    }
}

// ------------------------------------------------------------
// HTTP fetcher
// ------------------------------------------------------------

pub struct HttpArticleFetcher {
    client: reqwest::Client,
    browserless: Option<BrowserlessResolver>,
    cfg: FetcherConfig,
}

impl HttpArticleFetcher {
    pub fn new(cfg: FetcherConfig) -> Result<Self, ArticleError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));

        // every hop must pass the static SSRF checks
        let policy = Policy::custom(|attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                attempt.error("too many redirects")
            } else if !validate_url_offline(attempt.url().as_str()).valid {
                attempt.stop()
            } else {
                attempt.follow()
            }
        });

        let client = reqwest::Client::builder()
            .user_agent(BROWSER_UA)
            .default_headers(headers)
            .redirect(policy)
            .timeout(cfg.fetch_timeout)
            .build()
            .map_err(|e| ArticleError::Fetch {
                url: String::new(),
                message: format!("cannot build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            browserless: None,
            cfg,
        })
    }

    pub fn with_browserless(mut self, resolver: Option<BrowserlessResolver>) -> Self {
        self.browserless = resolver;
        self
    }

    async fn get_html(&self, url: &str, timeout: Duration) -> Result<(Url, String), ArticleError> {
        let resp = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ArticleError::Fetch {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ArticleError::Fetch {
                url: url.to_string(),
                message: format!("HTTP {status}"),
            });
        }
        let final_url = resp.url().clone();
        let body = resp.text().await.map_err(|e| ArticleError::Fetch {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        Ok((final_url, body))
    }

    /// Plain HTTP: follow redirects, then fall back to canonical/og:url for pages that
    /// redirect client-side.
    async fn resolve_over_http(&self, url: &str) -> Option<String> {
        let timeout = self.cfg.redirect_timeout + self.cfg.page_load_timeout;
        let (final_url, html) = match self.get_html(url, timeout).await {
            Ok(v) => v,
            Err(e) => {
                warn!(url, error = %e, "redirect resolution failed");
                return None;
            }
        };
        if !is_redirect_url(final_url.as_str(), &self.cfg.redirect_hosts) {
            return Some(final_url.to_string());
        }
        extract(&html, &final_url).canonical
    }

    fn accept_resolved(&self, original: &str, resolved: &str) -> bool {
        resolved != original && !is_redirect_url(resolved, &self.cfg.redirect_hosts)
    }
}

#[async_trait]
impl ArticleFetcher for HttpArticleFetcher {
    async fn resolve_redirect(&self, url: &str) -> Option<String> {
        let verdict = validate_url(url).await;
        if !verdict.valid {
            warn!(url, reason = verdict.reason.as_deref().unwrap_or_default(), "refusing to resolve unsafe url");
            return None;
        }

        let resolved = match &self.browserless {
            Some(b) => {
                match b
                    .final_url(url, self.cfg.redirect_timeout, self.cfg.page_load_timeout)
                    .await
                {
                    Ok(u) => Some(u),
                    Err(e) => {
                        warn!(url, error = %e, "browserless resolution failed");
                        None
                    }
                }
            }
            None => self.resolve_over_http(url).await,
        }?;

        if !self.accept_resolved(url, &resolved) {
            debug!(url, resolved = %resolved, "redirect did not leave the aggregator");
            return None;
        }
        let verdict = validate_url(&resolved).await;
        if !verdict.valid {
            warn!(
                url,
                resolved = %resolved,
                reason = verdict.reason.as_deref().unwrap_or_default(),
                "resolved url failed safety check"
            );
            return None;
        }
        info!(url, resolved = %resolved, "resolved redirect");
        Some(resolved)
    }

    async fn fetch_article(
        &self,
        url: &str,
        feed_id: i64,
    ) -> Result<PublishedArticle, ArticleError> {
        let verdict = validate_url(url).await;
        if !verdict.valid {
            return Err(ArticleError::UnsafeUrl {
                url: url.to_string(),
                reason: verdict.reason.unwrap_or_default(),
            });
        }

        let (final_url, html) = self.get_html(url, self.cfg.fetch_timeout).await?;
        let page = extract(&html, &final_url);

        let words = word_count(&page.text);
        if words < self.cfg.min_word_count {
            if let Some(phrase) = find_paywall_phrase(&html, &self.cfg.paywall_phrases) {
                debug!(url, phrase, "paywall phrase on short page");
                return Err(ArticleError::Paywall {
                    url: url.to_string(),
                });
            }
            return Err(ArticleError::InsufficientContent {
                url: url.to_string(),
                words,
                min: self.cfg.min_word_count,
            });
        }

        let summary_src = page.description.as_deref().unwrap_or(&page.text);
        Ok(PublishedArticle {
            url: final_url.to_string(),
            title: page.title,
            summary: summarize(summary_src, self.cfg.summary_chars),
            text: page.text,
            top_image: page.top_image,
            feed_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> FetcherConfig {
        FetcherConfig::from_settings(&Settings::default(), &DomainLists::default())
    }

    #[test]
    fn resolved_url_must_leave_the_aggregator() {
        let f = HttpArticleFetcher::new(cfg()).unwrap();
        let orig = "https://news.google.com/rss/articles/abc";
        assert!(!f.accept_resolved(orig, orig));
        assert!(!f.accept_resolved(orig, "https://news.google.com/articles/abc"));
        assert!(f.accept_resolved(orig, "https://www.reuters.com/world/x"));
    }

    #[tokio::test]
    async fn unsafe_urls_are_never_fetched() {
        let f = HttpArticleFetcher::new(cfg()).unwrap();
        let err = f.fetch_article("http://127.0.0.1/admin", 1).await.unwrap_err();
        assert!(matches!(err, ArticleError::UnsafeUrl { .. }));
        assert!(f.resolve_redirect("file:///etc/passwd").await.is_none());
    }

    #[test]
    fn browserless_script_reports_final_url() {
        assert!(RESOLVE_SCRIPT.contains("page.url()"));
        let parsed: ResolvedUrl =
            serde_json::from_str(r#"{"url":"https://example.com/a"}"#).unwrap();
        assert_eq!(parsed.url, "https://example.com/a");
    }
}
