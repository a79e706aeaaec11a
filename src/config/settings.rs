// src/config/settings.rs
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::model::Platform;

pub const ENV_CONFIG_PATH: &str = "NEWS_POSTER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/news_poster.toml";

/// Tunables for one run. Every field has a default so a missing file is a valid config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // candidate selection
    pub pool_selection_limit: usize,
    pub breaking_cap_ratio: f64,
    pub max_article_retries: usize,

    // similarity
    pub similarity_posts_limit: usize,
    pub min_keyword_length: usize,
    pub similarity_threshold: f64,
    pub similarity_text_chars: usize,
    pub recent_posts_limit: usize,

    // article fetching
    pub min_article_word_count: usize,
    pub summary_chars: usize,
    pub redirect_hosts: Vec<String>,
    pub redirect_timeout_secs: u64,
    pub page_load_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    pub domains_file: PathBuf,

    // generation
    pub generation_text_chars: usize,
    pub post_char_limit: usize,

    // url history
    pub history_file: PathBuf,
    pub history_capacity: usize,
    pub history_cleanup: usize,

    pub default_platforms: Vec<String>,
    pub feed: FeedSettings,
    pub ai: AiSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pool_selection_limit: 60,
            breaking_cap_ratio: 0.5,
            max_article_retries: 30,
            similarity_posts_limit: 72,
            min_keyword_length: 3,
            similarity_threshold: 0.5,
            similarity_text_chars: 500,
            recent_posts_limit: 60,
            min_article_word_count: 50,
            summary_chars: 100,
            redirect_hosts: vec!["news.google.com".to_string()],
            redirect_timeout_secs: 3,
            page_load_timeout_secs: 5,
            fetch_timeout_secs: 20,
            domains_file: PathBuf::from("config/domains.toml"),
            generation_text_chars: 4000,
            post_char_limit: 280,
            history_file: PathBuf::from("posted_urls.txt"),
            history_capacity: 100,
            history_cleanup: 10,
            default_platforms: vec!["bluesky".to_string(), "twitter".to_string()],
            feed: FeedSettings::default(),
            ai: AiSettings::default(),
        }
    }
}

/// Feed query shape: how many rows to pull and how to split them across categories.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    pub total_results: usize,
    /// Share of `total_results` per category. The last entry absorbs rounding remainder.
    pub categories: Vec<CategoryShare>,
    pub lookback_hours: i64,
    pub language_id: i32,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            total_results: 120,
            categories: vec![
                CategoryShare { id: 1, share: 0.5 },
                CategoryShare { id: 2, share: 0.4 },
                CategoryShare { id: 3, share: 0.1 },
            ],
            lookback_hours: 24,
            language_id: 23,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryShare {
    pub id: i32,
    pub share: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiSettings {
    /// "gemini" | "openai" | "disabled" (case-insensitive)
    pub provider: String,
    pub model: Option<String>,
    /// "ENV" means: read GOOGLE_AI_API_KEY / OPENAI_API_KEY depending on provider
    pub api_key: String,
    pub timeout_secs: u64,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: None,
            api_key: "ENV".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Settings {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let mut cfg: Settings = toml::from_str(&data).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        cfg.ai.provider = cfg.ai.provider.trim().to_lowercase();
        Ok(cfg)
    }

    /// $NEWS_POSTER_CONFIG, then config/news_poster.toml, then defaults.
    pub fn load_default() -> Result<Self, ConfigError> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            return Self::load_from_file(PathBuf::from(p));
        }
        let p = PathBuf::from(DEFAULT_CONFIG_PATH);
        if p.exists() {
            return Self::load_from_file(&p);
        }
        Ok(Self::default())
    }

    /// Breaking stories admitted to the working pool: floor(limit * ratio).
    pub fn breaking_cap(&self) -> usize {
        (self.pool_selection_limit as f64 * self.breaking_cap_ratio).floor() as usize
    }

    pub fn platforms(&self) -> Vec<Platform> {
        parse_platforms(&self.default_platforms)
    }

    /// Resolve the AI key: literal value, or the provider's env var when set to "ENV".
    pub fn resolve_ai_key(&self) -> Result<Option<String>, ConfigError> {
        if self.ai.provider == "disabled" {
            return Ok(None);
        }
        if !self.ai.api_key.trim().eq_ignore_ascii_case("env") {
            return Ok(Some(self.ai.api_key.clone()));
        }
        let var = match self.ai.provider.as_str() {
            "openai" => "OPENAI_API_KEY",
            _ => "GOOGLE_AI_API_KEY",
        };
        std::env::var(var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(Some)
            .ok_or(ConfigError::MissingEnv(var))
    }

    /// Collect every violation instead of stopping at the first one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        let usize_bounds = [
            ("min_article_word_count", self.min_article_word_count, 1, 500),
            ("similarity_posts_limit", self.similarity_posts_limit, 1, 500),
            ("pool_selection_limit", self.pool_selection_limit, 1, 200),
            ("post_char_limit", self.post_char_limit, 50, 500),
            ("feed.total_results", self.feed.total_results, 1, 1000),
            ("max_article_retries", self.max_article_retries, 1, 200),
            ("history_capacity", self.history_capacity, 1, 100_000),
        ];
        for (name, value, min, max) in usize_bounds {
            if value < min || value > max {
                errors.push(format!("{name} must be between {min} and {max}, got {value}"));
            }
        }

        let ratio_bounds = [
            ("similarity_threshold", self.similarity_threshold),
            ("breaking_cap_ratio", self.breaking_cap_ratio),
        ];
        for (name, value) in ratio_bounds {
            if !(0.0..=1.0).contains(&value) {
                errors.push(format!("{name} must be between 0.0 and 1.0, got {value}"));
            }
        }

        let mut total_alloc = 0.0;
        for c in &self.feed.categories {
            if !(0.0..=1.0).contains(&c.share) {
                errors.push(format!(
                    "feed.categories[{}].share must be between 0.0 and 1.0, got {}",
                    c.id, c.share
                ));
            }
            total_alloc += c.share;
        }
        if total_alloc > 1.0 + f64::EPSILON {
            errors.push(format!(
                "category allocations sum to {total_alloc}, must be <= 1.0"
            ));
        }

        let timeouts = [
            ("redirect_timeout_secs", self.redirect_timeout_secs),
            ("page_load_timeout_secs", self.page_load_timeout_secs),
            ("fetch_timeout_secs", self.fetch_timeout_secs),
            ("ai.timeout_secs", self.ai.timeout_secs),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                errors.push(format!("{name} must be positive, got {value}"));
            }
        }

        if self.history_cleanup == 0 || self.history_cleanup > self.history_capacity {
            errors.push(format!(
                "history_cleanup must be between 1 and history_capacity ({}), got {}",
                self.history_capacity, self.history_cleanup
            ));
        }

        if !matches!(self.ai.provider.as_str(), "gemini" | "openai" | "disabled") {
            errors.push(format!("unsupported ai.provider {}", self.ai.provider));
        }

        for p in &self.default_platforms {
            if Platform::parse(p).is_none() {
                errors.push(format!("unknown platform {p:?} in default_platforms"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }
}

/// Parse platform names, dropping unknown ones and duplicates, keeping order.
pub fn parse_platforms<S: AsRef<str>>(names: &[S]) -> Vec<Platform> {
    let mut out = Vec::new();
    for n in names {
        match Platform::parse(n.as_ref()) {
            Some(p) if !out.contains(&p) => out.push(p),
            Some(_) => {}
            None => tracing::warn!(platform = n.as_ref(), "ignoring unknown platform"),
        }
    }
    out
}
