// src/config/domains.rs
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Externally configured filter data: which sites to skip and which phrases mean "paywall".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainLists {
    pub paywall_domains: Vec<String>,
    pub blocked_domains: Vec<String>,
    pub paywall_phrases: Vec<String>,
    pub pr_title_patterns: Vec<String>,
}

pub fn default_paywall_phrases() -> Vec<String> {
    [
        "subscribe",
        "subscription",
        "sign in",
        "premium content",
        "premium article",
        "paid subscribers only",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Deserialize)]
struct RawLists {
    #[serde(default)]
    paywall_domains: Vec<String>,
    #[serde(default)]
    blocked_domains: Vec<String>,
    #[serde(default)]
    paywall_phrases: Option<Vec<String>>,
    #[serde(default)]
    pr_title_patterns: Vec<String>,
}

impl DomainLists {
    /// Load from TOML or JSON (chosen by extension, with fallback to the other format).
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading domain lists from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        parse_lists(&content, &ext)
    }

    /// Missing file → built-in defaults (paywall phrases only).
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from(path)
        } else {
            tracing::info!(path = %path.display(), "domain list file not found, using defaults");
            Ok(Self {
                paywall_phrases: default_paywall_phrases(),
                ..Default::default()
            })
        }
    }
}

fn parse_lists(s: &str, hint_ext: &str) -> Result<DomainLists> {
    let raw: RawLists = if hint_ext == "json" {
        serde_json::from_str::<RawLists>(s).or_else(|_| {
            toml::from_str::<RawLists>(s)
                .map_err(|e| anyhow!("unsupported domain list format: {e}"))
        })?
    } else {
        match toml::from_str::<RawLists>(s) {
            Ok(v) => v,
            Err(toml_err) => serde_json::from_str(s)
                .map_err(|_| anyhow!("unsupported domain list format: {toml_err}"))?,
        }
    };
    Ok(DomainLists {
        paywall_domains: clean_domains(raw.paywall_domains),
        blocked_domains: clean_domains(raw.blocked_domains),
        paywall_phrases: raw
            .paywall_phrases
            .map(clean_phrases)
            .unwrap_or_else(default_paywall_phrases),
        pr_title_patterns: raw
            .pr_title_patterns
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
    })
}

/// Trim, lowercase, drop scheme/`www.`/paths, dedup. Entries must be base domains.
fn clean_domains(items: Vec<String>) -> Vec<String> {
    let mut set = BTreeSet::new();
    for it in items {
        let lower = it.trim().to_ascii_lowercase();
        let rest = lower.split_once("://").map(|(_, r)| r).unwrap_or(lower.as_str());
        let host = rest.split('/').next().unwrap_or_default();
        let host = host.strip_prefix("www.").unwrap_or(host);
        if !host.is_empty() {
            set.insert(host.to_string());
        }
    }
    set.into_iter().collect()
}

fn clean_phrases(items: Vec<String>) -> Vec<String> {
    let mut set = BTreeSet::new();
    for it in items {
        let t = it.trim().to_lowercase();
        if !t.is_empty() {
            set.insert(t);
        }
    }
    set.into_iter().collect()
}
