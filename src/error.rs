// src/error.rs
//! Error taxonomy. Article, social and AI errors are recoverable at the per-candidate
//! boundary; configuration and database errors abort the run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration validation failed:\n{}", .0.iter().map(|e| format!("  - {e}")).collect::<Vec<_>>().join("\n"))]
    Invalid(Vec<String>),

    #[error("missing required environment variable {0}")]
    MissingEnv(&'static str),

    #[error("cannot read {path}: {message}")]
    Read { path: String, message: String },
}

#[derive(Debug, Error)]
pub enum ArticleError {
    #[error("paywall detected at {url}")]
    Paywall { url: String },

    #[error("fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("could not parse {url}: {message}")]
    Parse { url: String, message: String },

    #[error("only {words} words at {url} (need {min})")]
    InsufficientContent { url: String, words: usize, min: usize },

    #[error("unsafe url {url}: {reason}")]
    UnsafeUrl { url: String, reason: String },
}

#[derive(Debug, Error)]
pub enum SocialError {
    #[error("{platform} authentication failed: {message}")]
    Authentication { platform: &'static str, message: String },

    #[error("{platform} post failed: {message}")]
    Posting { platform: &'static str, message: String },

    #[error("{platform} rate limited")]
    RateLimited { platform: &'static str },

    #[error("{platform} media upload failed: {message}")]
    MediaUpload { platform: &'static str, message: String },
}

impl SocialError {
    /// Authentication failures end that platform's session; everything else is per-post.
    pub fn is_fatal_for_platform(&self) -> bool {
        matches!(self, SocialError::Authentication { .. })
    }
}

#[derive(Debug, Error)]
pub enum AiError {
    #[error("AI provider disabled")]
    Disabled,

    #[error("AI request failed: {0}")]
    Http(String),

    #[error("AI provider returned status {0}")]
    Status(u16),

    #[error("AI provider returned an empty response")]
    EmptyResponse,

    #[error("AI call timed out after {0}s")]
    Timeout(u64),
}

impl From<reqwest::Error> for AiError {
    fn from(err: reqwest::Error) -> Self {
        AiError::Http(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("database connection failed: {0}")]
    Connection(String),

    #[error("database query failed: {0}")]
    Query(String),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Configuration(_) => DatabaseError::Connection(err.to_string()),
            other => DatabaseError::Query(other.to_string()),
        }
    }
}

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("no enabled platform could authenticate")]
    NoPlatforms,
}
