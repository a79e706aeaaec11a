// src/publish/twitter.rs
//! X / Twitter API v2 with an OAuth2 user-context bearer token.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::{backoff, is_transient, status_error, PostRequest, Publisher};
use crate::error::{ConfigError, SocialError};
use crate::generator::clamp_chars;
use crate::model::{Platform, RecentPost};

const PLATFORM: &str = "twitter";
const API_BASE: &str = "https://api.twitter.com/2";
const TWEET_LIMIT: usize = 280;
/// Every link counts as this many characters after t.co wrapping.
const LINK_WEIGHT: usize = 23;

pub struct TwitterPublisher {
    client: Client,
    base_url: String,
    token: String,
    user_id: Mutex<Option<String>>,
    max_retries: u8,
}

impl TwitterPublisher {
    pub fn new(token: String, user_id: Option<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(20))
                .build()
                .unwrap_or_default(),
            base_url: API_BASE.to_string(),
            token,
            user_id: Mutex::new(user_id),
            max_retries: 3,
        }
    }

    /// `TWITTER_BEARER_TOKEN` (required) and `TWITTER_USER_ID` (looked up when absent).
    pub fn from_env() -> Result<Self, ConfigError> {
        let token = std::env::var("TWITTER_BEARER_TOKEN")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingEnv("TWITTER_BEARER_TOKEN"))?;
        let user_id = std::env::var("TWITTER_USER_ID")
            .ok()
            .filter(|v| !v.trim().is_empty());
        Ok(Self::new(token, user_id))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn user_id(&self) -> Option<String> {
        self.user_id.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

/// Post text with the article link appended, shortened so the whole tweet fits.
pub fn tweet_text(text: &str, article_url: &str) -> String {
    let budget = TWEET_LIMIT - LINK_WEIGHT - 1;
    format!("{} {article_url}", clamp_chars(text, budget))
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}
#[derive(Deserialize)]
struct Me {
    id: String,
}
#[derive(Deserialize)]
struct Tweet {
    #[serde(default)]
    id: String,
    #[serde(default)]
    text: String,
    created_at: Option<DateTime<Utc>>,
}

fn transport(e: reqwest::Error) -> SocialError {
    SocialError::Posting {
        platform: PLATFORM,
        message: e.to_string(),
    }
}

#[async_trait]
impl Publisher for TwitterPublisher {
    fn platform(&self) -> Platform {
        Platform::Twitter
    }

    async fn authenticate(&self) -> Result<(), SocialError> {
        let resp = self
            .client
            .get(format!("{}/users/me", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| SocialError::Authentication {
                platform: PLATFORM,
                message: e.to_string(),
            })?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SocialError::Authentication {
                platform: PLATFORM,
                message: format!("HTTP {status}: {}", body.chars().take(200).collect::<String>()),
            });
        }
        let me: Envelope<Me> = resp.json().await.map_err(transport)?;
        let mut slot = self.user_id.lock().unwrap_or_else(|p| p.into_inner());
        if slot.is_none() {
            *slot = me.data.map(|m| m.id);
        }
        info!(user_id = slot.as_deref().unwrap_or_default(), "twitter token verified");
        Ok(())
    }

    async fn recent_posts(&self, limit: usize) -> Result<Vec<RecentPost>, SocialError> {
        let Some(user_id) = self.user_id() else {
            return Err(SocialError::Authentication {
                platform: PLATFORM,
                message: "user id unknown, authenticate first".into(),
            });
        };
        let max = limit.clamp(5, 100).to_string();
        let resp = self
            .client
            .get(format!("{}/users/{user_id}/tweets", self.base_url))
            .bearer_auth(&self.token)
            .query(&[("max_results", max.as_str()), ("tweet.fields", "created_at")])
            .send()
            .await
            .map_err(transport)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(PLATFORM, status, &body));
        }
        let tweets: Envelope<Vec<Tweet>> = resp.json().await.map_err(transport)?;
        Ok(tweets
            .data
            .unwrap_or_default()
            .into_iter()
            .take(limit)
            .map(|t| RecentPost {
                text: t.text,
                url: None,
                title: None,
                timestamp: t.created_at.unwrap_or_else(Utc::now),
            })
            .collect())
    }

    async fn publish(&self, post: &PostRequest<'_>) -> Result<Option<String>, SocialError> {
        let body = json!({ "text": tweet_text(post.text, post.article_url) });

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(format!("{}/tweets", self.base_url))
                .bearer_auth(&self.token)
                .json(&body)
                .send()
                .await;

            let (status, err) = match res {
                Ok(rsp) if rsp.status().is_success() => {
                    let created: Envelope<Tweet> = rsp.json().await.map_err(transport)?;
                    let id = created.data.map(|t| t.id).filter(|id| !id.is_empty());
                    info!(tweet_id = id.as_deref().unwrap_or_default(), "posted to twitter");
                    return Ok(id);
                }
                Ok(rsp) => {
                    let status = rsp.status();
                    let text = rsp.text().await.unwrap_or_default();
                    (Some(status), status_error(PLATFORM, status, &text))
                }
                Err(e) => (None, transport(e)),
            };
            if attempt < self.max_retries && is_transient(status) {
                warn!(attempt, error = %err, "tweet failed, retrying");
                tokio::time::sleep(backoff(attempt)).await;
                continue;
            }
            return Err(err);
        }
    }
}
