// src/model.rs
//! Core records flowing through one curation run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Feed category as stored in the feed table (`Category_ID`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    World,
    National,
    Business,
    Other(i32),
}

impl Category {
    pub fn from_id(id: i32) -> Self {
        match id {
            1 => Category::World,
            2 => Category::National,
            3 => Category::Business,
            other => Category::Other(other),
        }
    }

    pub fn id(&self) -> i32 {
        match self {
            Category::World => 1,
            Category::National => 2,
            Category::Business => 3,
            Category::Other(id) => *id,
        }
    }
}

/// One row from the candidate pool. Read-only once it leaves the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateArticle {
    pub url: String,
    pub title: String,
    pub feed_id: i64,
    /// Independent sources reporting the story; `> 1` means breaking.
    #[serde(default = "default_source_count")]
    pub source_count: u32,
    pub category: Category,
}

fn default_source_count() -> u32 {
    1
}

impl CandidateArticle {
    pub fn new(feed_id: i64, url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            feed_id,
            source_count: default_source_count(),
            category: Category::World,
        }
    }

    pub fn with_source_count(mut self, source_count: u32) -> Self {
        self.source_count = source_count;
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn is_breaking(&self) -> bool {
        self.source_count > 1
    }
}

/// A post already published on one of the platforms; only used for duplicate avoidance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentPost {
    pub text: String,
    pub url: Option<String>,
    pub title: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Scraped version of a candidate, ready for generation and publishing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedArticle {
    pub url: String,
    pub title: String,
    pub text: String,
    pub summary: String,
    pub top_image: Option<String>,
    pub feed_id: i64,
}

/// Byte range of a hashtag inside the post text (Bluesky facets index bytes, not chars).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashtagFacet {
    pub tag: String,
    pub byte_start: usize,
    pub byte_end: usize,
}

/// Output of the content generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedPost {
    pub text: String,
    pub summary: String,
    pub hashtags: Vec<HashtagFacet>,
}

/// Social platforms we can publish to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Bluesky,
    Twitter,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Bluesky => "bluesky",
            Platform::Twitter => "twitter",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bluesky" | "bsky" => Some(Platform::Bluesky),
            "twitter" | "x" => Some(Platform::Twitter),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
