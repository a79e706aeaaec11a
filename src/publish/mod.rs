// src/publish/mod.rs
//! One publisher per social platform behind a common trait.

pub mod bluesky;
pub mod twitter;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::error::{ConfigError, SocialError};
use crate::model::{HashtagFacet, Platform, RecentPost};

pub use bluesky::BlueskyPublisher;
pub use twitter::TwitterPublisher;

/// Everything a platform needs to publish one article post.
#[derive(Debug, Clone, Copy)]
pub struct PostRequest<'a> {
    pub text: &'a str,
    pub article_url: &'a str,
    pub article_title: &'a str,
    pub description: &'a str,
    pub image_url: Option<&'a str>,
    pub hashtags: &'a [HashtagFacet],
}

#[async_trait]
pub trait Publisher: Send + Sync {
    fn platform(&self) -> Platform;

    /// Open (or check) the session. Failure here ends this platform for the run.
    async fn authenticate(&self) -> Result<(), SocialError>;

    async fn recent_posts(&self, limit: usize) -> Result<Vec<RecentPost>, SocialError>;

    /// Returns the platform's id for the new post when it reports one.
    async fn publish(&self, post: &PostRequest<'_>) -> Result<Option<String>, SocialError>;
}

pub type DynPublisher = Arc<dyn Publisher>;

/// `ENABLE_<PLATFORM>` toggle; anything but 0/false/no/off counts as enabled, unset too.
pub fn platform_enabled(p: Platform) -> bool {
    let var = match p {
        Platform::Bluesky => "ENABLE_BLUESKY",
        Platform::Twitter => "ENABLE_TWITTER",
    };
    match std::env::var(var) {
        Ok(v) => !matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "0" | "false" | "no" | "off"
        ),
        Err(_) => true,
    }
}

/// Build the publishers for `platforms`, skipping ones switched off in env or missing
/// credentials. An empty result is left for the run to report.
pub fn build_publishers(platforms: &[Platform]) -> Vec<DynPublisher> {
    let mut out: Vec<DynPublisher> = Vec::new();
    for &p in platforms {
        if !platform_enabled(p) {
            tracing::info!(platform = %p, "platform disabled via env");
            continue;
        }
        let built: Result<DynPublisher, ConfigError> = match p {
            Platform::Bluesky => BlueskyPublisher::from_env().map(|b| Arc::new(b) as DynPublisher),
            Platform::Twitter => TwitterPublisher::from_env().map(|t| Arc::new(t) as DynPublisher),
        };
        match built {
            Ok(publisher) => out.push(publisher),
            Err(e) => tracing::error!(platform = %p, error = %e, "platform not configured, skipping it"),
        }
    }
    out
}

/// Map a non-success HTTP status to the social error taxonomy.
pub(crate) fn status_error(platform: &'static str, status: StatusCode, body: &str) -> SocialError {
    let snippet: String = body.chars().take(200).collect();
    match status {
        StatusCode::UNAUTHORIZED => SocialError::Authentication {
            platform,
            message: format!("HTTP {status}: {snippet}"),
        },
        StatusCode::TOO_MANY_REQUESTS => SocialError::RateLimited { platform },
        _ => SocialError::Posting {
            platform,
            message: format!("HTTP {status}: {snippet}"),
        },
    }
}

/// 5xx and transport errors are worth another attempt; everything else is final.
pub(crate) fn is_transient(status: Option<StatusCode>) -> bool {
    status.map_or(true, |s| s.is_server_error())
}

pub(crate) fn backoff(attempt: u8) -> Duration {
    Duration::from_millis(500u64 << (attempt.saturating_sub(1)).min(6))
}
