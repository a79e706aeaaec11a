// src/publish/bluesky.rs
//! Bluesky over AT Protocol XRPC: app-password session, author feed, link card post.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{backoff, is_transient, status_error, PostRequest, Publisher};
use crate::error::{ConfigError, SocialError};
use crate::model::{HashtagFacet, Platform, RecentPost};
use crate::url_safety::validate_url;

const PLATFORM: &str = "bluesky";
const DEFAULT_SERVICE: &str = "https://bsky.social";
const MAX_THUMB_BYTES: usize = 1_000_000;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Session {
    access_jwt: String,
    did: String,
}

pub struct BlueskyPublisher {
    client: Client,
    service: String,
    identifier: String,
    password: String,
    session: Mutex<Option<Session>>,
    max_retries: u8,
}

impl BlueskyPublisher {
    pub fn new(identifier: String, password: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(20))
                .build()
                .unwrap_or_default(),
            service: DEFAULT_SERVICE.to_string(),
            identifier,
            password,
            session: Mutex::new(None),
            max_retries: 3,
        }
    }

    /// `BLUESKY_HANDLE` + `BLUESKY_APP_PASSWORD`, or the `AT_PROTOCOL_*` pair.
    pub fn from_env() -> Result<Self, ConfigError> {
        let identifier = env_any(&["BLUESKY_HANDLE", "AT_PROTOCOL_USERNAME"])
            .ok_or(ConfigError::MissingEnv("BLUESKY_HANDLE"))?;
        let password = env_any(&["BLUESKY_APP_PASSWORD", "AT_PROTOCOL_PASSWORD"])
            .ok_or(ConfigError::MissingEnv("BLUESKY_APP_PASSWORD"))?;
        let mut p = Self::new(identifier, password);
        if let Some(service) = env_any(&["BLUESKY_SERVICE"]) {
            p.service = service.trim_end_matches('/').to_string();
        }
        Ok(p)
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    fn xrpc(&self, method: &str) -> String {
        format!("{}/xrpc/{method}", self.service)
    }

    fn current_session(&self) -> Result<Session, SocialError> {
        self.session
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
            .ok_or_else(|| SocialError::Authentication {
                platform: PLATFORM,
                message: "no session, authenticate first".into(),
            })
    }

    /// Download the article image and upload it as a blob. Best effort.
    async fn upload_thumb(&self, session: &Session, image_url: &str) -> Option<Value> {
        if !validate_url(image_url).await.valid {
            debug!(image_url, "skipping unsafe thumbnail url");
            return None;
        }
        let resp = self.client.get(image_url).send().await.ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let mime = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();
        if !mime.starts_with("image/") {
            return None;
        }
        let bytes = resp.bytes().await.ok()?;
        if bytes.is_empty() || bytes.len() > MAX_THUMB_BYTES {
            debug!(image_url, size = bytes.len(), "thumbnail size out of range");
            return None;
        }

        let resp = self
            .client
            .post(self.xrpc("com.atproto.repo.uploadBlob"))
            .bearer_auth(&session.access_jwt)
            .header(reqwest::header::CONTENT_TYPE, mime)
            .body(bytes)
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            let err = SocialError::MediaUpload {
                platform: PLATFORM,
                message: format!("HTTP {}", resp.status()),
            };
            warn!(error = %err, "thumbnail upload failed, posting without it");
            return None;
        }
        let body: Value = resp.json().await.ok()?;
        body.get("blob").cloned()
    }
}

fn env_any(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|n| std::env::var(n).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

fn facets_json(tags: &[HashtagFacet]) -> Vec<Value> {
    tags.iter()
        .map(|t| {
            json!({
                "index": { "byteStart": t.byte_start, "byteEnd": t.byte_end },
                "features": [{ "$type": "app.bsky.richtext.facet#tag", "tag": t.tag }]
            })
        })
        .collect()
}

fn post_record(post: &PostRequest<'_>, thumb: Option<Value>, now: DateTime<Utc>) -> Value {
    let mut external = json!({
        "uri": post.article_url,
        "title": post.article_title,
        "description": post.description,
    });
    if let Some(blob) = thumb {
        external["thumb"] = blob;
    }
    let mut record = json!({
        "$type": "app.bsky.feed.post",
        "text": post.text,
        "createdAt": now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        "langs": ["en"],
        "embed": { "$type": "app.bsky.embed.external", "external": external },
    });
    if !post.hashtags.is_empty() {
        record["facets"] = Value::Array(facets_json(post.hashtags));
    }
    record
}

#[derive(Deserialize)]
struct AuthorFeed {
    #[serde(default)]
    feed: Vec<FeedItem>,
}
#[derive(Deserialize)]
struct FeedItem {
    post: PostView,
}
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostView {
    #[serde(default)]
    record: Value,
    indexed_at: Option<DateTime<Utc>>,
}

fn to_recent(view: PostView) -> RecentPost {
    let rec = &view.record;
    let text = rec["text"].as_str().unwrap_or_default().to_string();
    let external = &rec["embed"]["external"];
    let created = rec["createdAt"]
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc));
    RecentPost {
        text,
        url: external["uri"].as_str().map(str::to_string),
        title: external["title"]
            .as_str()
            .filter(|t| !t.trim().is_empty())
            .map(str::to_string),
        timestamp: created.or(view.indexed_at).unwrap_or_else(Utc::now),
    }
}

#[async_trait]
impl Publisher for BlueskyPublisher {
    fn platform(&self) -> Platform {
        Platform::Bluesky
    }

    async fn authenticate(&self) -> Result<(), SocialError> {
        let resp = self
            .client
            .post(self.xrpc("com.atproto.server.createSession"))
            .json(&json!({ "identifier": self.identifier, "password": self.password }))
            .send()
            .await
            .map_err(|e| SocialError::Authentication {
                platform: PLATFORM,
                message: e.to_string(),
            })?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            // any rejected login ends the session for this run
            return Err(SocialError::Authentication {
                platform: PLATFORM,
                message: format!("HTTP {status}: {}", body.chars().take(200).collect::<String>()),
            });
        }
        let session: Session = resp.json().await.map_err(|e| SocialError::Authentication {
            platform: PLATFORM,
            message: e.to_string(),
        })?;
        info!(did = %session.did, "bluesky session created");
        *self.session.lock().unwrap_or_else(|p| p.into_inner()) = Some(session);
        Ok(())
    }

    async fn recent_posts(&self, limit: usize) -> Result<Vec<RecentPost>, SocialError> {
        let session = self.current_session()?;
        let limit = limit.clamp(1, 100).to_string();
        let resp = self
            .client
            .get(self.xrpc("app.bsky.feed.getAuthorFeed"))
            .bearer_auth(&session.access_jwt)
            .query(&[("actor", session.did.as_str()), ("limit", limit.as_str())])
            .send()
            .await
            .map_err(|e| SocialError::Posting {
                platform: PLATFORM,
                message: e.to_string(),
            })?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(PLATFORM, status, &body));
        }
        let feed: AuthorFeed = resp.json().await.map_err(|e| SocialError::Posting {
            platform: PLATFORM,
            message: e.to_string(),
        })?;
        Ok(feed.feed.into_iter().map(|i| to_recent(i.post)).collect())
    }

    async fn publish(&self, post: &PostRequest<'_>) -> Result<Option<String>, SocialError> {
        let session = self.current_session()?;
        let thumb = match post.image_url {
            Some(url) => self.upload_thumb(&session, url).await,
            None => None,
        };
        let body = json!({
            "repo": session.did,
            "collection": "app.bsky.feed.post",
            "record": post_record(post, thumb, Utc::now()),
        });

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(self.xrpc("com.atproto.repo.createRecord"))
                .bearer_auth(&session.access_jwt)
                .json(&body)
                .send()
                .await;

            let (status, err) = match res {
                Ok(rsp) if rsp.status().is_success() => {
                    let created: Value = rsp.json().await.unwrap_or_default();
                    let uri = created["uri"].as_str().map(str::to_string);
                    info!(uri = uri.as_deref().unwrap_or_default(), "posted to bluesky");
                    return Ok(uri);
                }
                Ok(rsp) => {
                    let status = rsp.status();
                    let text = rsp.text().await.unwrap_or_default();
                    (Some(status), status_error(PLATFORM, status, &text))
                }
                Err(e) => (
                    None,
                    SocialError::Posting {
                        platform: PLATFORM,
                        message: e.to_string(),
                    },
                ),
            };
            if attempt < self.max_retries && is_transient(status) {
                warn!(attempt, error = %err, "bluesky post failed, retrying");
                tokio::time::sleep(backoff(attempt)).await;
                continue;
            }
            return Err(err);
        }
    }
}
