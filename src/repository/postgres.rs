// src/repository/postgres.rs
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use tracing::{debug, info};

use super::allocation::{allocate, apply_quotas, count_by_category};
use super::{FeedRepository, UsageRecord};
use crate::config::FeedSettings;
use crate::error::{ConfigError, DatabaseError};
use crate::model::{CandidateArticle, Category, Platform};

pub const ENV_DATABASE_URL: &str = "DATABASE_URL";

const ELIGIBLE_SQL: &str = r#"
SELECT news_feed_id, url, title, source_count, category_id
FROM news_feed
WHERE language_id = $1
  AND category_id = ANY($2)
  AND published_date >= $3
  AND source_count > 0
  AND NOT used_in_bsky
  AND NOT used_in_twitter
"#;

#[derive(Debug, FromRow)]
struct FeedRow {
    news_feed_id: i64,
    url: String,
    title: String,
    source_count: i32,
    category_id: i32,
}

impl From<FeedRow> for CandidateArticle {
    fn from(r: FeedRow) -> Self {
        CandidateArticle::new(r.news_feed_id, r.url, r.title)
            .with_source_count(r.source_count.max(0) as u32)
            .with_category(Category::from_id(r.category_id))
    }
}

/// Column pair written for each platform.
fn platform_columns(p: Platform) -> (&'static str, &'static str) {
    match p {
        Platform::Bluesky => ("used_in_bsky", "bsky_post"),
        Platform::Twitter => ("used_in_twitter", "twitter_post"),
    }
}

fn mark_used_sql(p: Platform) -> String {
    let (flag, text_col) = platform_columns(p);
    format!(
        "UPDATE news_feed SET article_text = $1, {flag} = TRUE, {text_col} = $2, \
         article_url = $3, article_img = $4 WHERE news_feed_id = $5"
    )
}

pub struct PgFeedRepository {
    pool: PgPool,
    feed: FeedSettings,
}

impl PgFeedRepository {
    pub fn new(pool: PgPool, feed: FeedSettings) -> Self {
        Self { pool, feed }
    }

    pub async fn connect(database_url: &str, feed: FeedSettings) -> Result<Self, DatabaseError> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;
        info!("connected to feed database");
        Ok(Self::new(pool, feed))
    }

    pub fn database_url_from_env() -> Result<String, ConfigError> {
        std::env::var(ENV_DATABASE_URL)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingEnv(ENV_DATABASE_URL))
    }
}

#[async_trait]
impl FeedRepository for PgFeedRepository {
    async fn candidate_pool(&self) -> Result<Vec<CandidateArticle>, DatabaseError> {
        let categories: Vec<i32> = self.feed.categories.iter().map(|c| c.id).collect();
        let cutoff = Utc::now() - chrono::Duration::hours(self.feed.lookback_hours);

        let rows: Vec<CandidateArticle> = sqlx::query_as::<_, FeedRow>(ELIGIBLE_SQL)
            .bind(self.feed.language_id)
            .bind(&categories)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(CandidateArticle::from)
            .collect();

        let quotas = allocate(
            self.feed.total_results,
            &self.feed.categories,
            &count_by_category(&rows),
        );
        for q in &quotas {
            debug!(
                category = q.category_id,
                available = q.available,
                target = q.target,
                allocated = q.allocated,
                "category quota"
            );
        }
        let eligible = rows.len();
        let pool = apply_quotas(rows, &quotas, &mut rand::rng());
        info!(eligible, selected = pool.len(), "candidate pool loaded");
        Ok(pool)
    }

    async fn mark_used(&self, record: &UsageRecord<'_>) -> Result<bool, DatabaseError> {
        let done = sqlx::query(&mark_used_sql(record.platform))
            .bind(record.article_text)
            .bind(record.post_text)
            .bind(record.article_url)
            .bind(record.image_url)
            .bind(record.feed_id)
            .execute(&self.pool)
            .await?;
        let updated = done.rows_affected() > 0;
        info!(
            feed_id = record.feed_id,
            platform = %record.platform,
            updated,
            "marked feed item as used"
        );
        Ok(updated)
    }
}
