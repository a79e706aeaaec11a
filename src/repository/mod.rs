// src/repository/mod.rs
//! Feed Repository: where candidates come from and where successful posts are recorded.

pub mod allocation;
pub mod postgres;

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::model::{CandidateArticle, Platform};

pub use postgres::PgFeedRepository;

/// What gets written back after a platform accepted a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRecord<'a> {
    pub feed_id: i64,
    pub platform: Platform,
    pub article_text: &'a str,
    pub post_text: &'a str,
    pub article_url: &'a str,
    pub image_url: Option<&'a str>,
}

#[async_trait]
pub trait FeedRepository: Send + Sync {
    /// Recent, unused, quota-allocated candidates.
    async fn candidate_pool(&self) -> Result<Vec<CandidateArticle>, DatabaseError>;

    /// Flag the row as used on `record.platform`. `Ok(false)` when no row matched.
    async fn mark_used(&self, record: &UsageRecord<'_>) -> Result<bool, DatabaseError>;
}
