// src/selector.rs
//! Candidate selection: breaking-news partition and cap, shuffled regular fill, LLM
//! ranking, and the deterministic fallback used whenever ranking yields nothing usable.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::ai::parse::{parse_ranked_list, RankedEntry};
use crate::ai::{complete_within, DynLlm};
use crate::config::Settings;
use crate::model::{CandidateArticle, RecentPost};

/// Selection knobs, copied out of [`Settings`] so tests can build them directly.
#[derive(Debug, Clone)]
pub struct SelectorConfig {
    /// Upper bound on the working pool shown to the ranker.
    pub pool_selection_limit: usize,
    /// Max breaking stories admitted to the working pool.
    pub breaking_cap: usize,
    pub ai_timeout: Duration,
}

impl SelectorConfig {
    pub fn from_settings(s: &Settings) -> Self {
        Self {
            pool_selection_limit: s.pool_selection_limit,
            breaking_cap: s.breaking_cap(),
            ai_timeout: Duration::from_secs(s.ai.timeout_secs),
        }
    }
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

pub struct CandidateSelector {
    llm: DynLlm,
    cfg: SelectorConfig,
}

impl CandidateSelector {
    pub fn new(llm: DynLlm, cfg: SelectorConfig) -> Self {
        Self { llm, cfg }
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.cfg
    }

    /// Admitted breaking stories (source count desc, capped) followed by shuffled regular
    /// stories, at most `pool_selection_limit` long and unique by `feed_id`.
    pub fn build_working_pool<R: Rng + ?Sized>(
        &self,
        pool: &[CandidateArticle],
        rng: &mut R,
    ) -> Vec<CandidateArticle> {
        let limit = self.cfg.pool_selection_limit;
        let mut seen = HashSet::new();
        let (mut breaking, mut regular): (Vec<_>, Vec<_>) = pool
            .iter()
            .filter(|c| seen.insert(c.feed_id))
            .cloned()
            .partition(|c| c.is_breaking());

        // stable: equal counts keep pool order
        breaking.sort_by(|a, b| b.source_count.cmp(&a.source_count));
        let total_breaking = breaking.len();
        breaking.truncate(self.cfg.breaking_cap.min(limit));
        if total_breaking > breaking.len() {
            debug!(
                total = total_breaking,
                admitted = breaking.len(),
                "breaking news capped"
            );
        }

        regular.shuffle(rng);
        regular.truncate(limit - breaking.len());

        breaking.extend(regular);
        breaking
    }

    /// Ordered candidates to attempt, never more than `max_count`. Never fails: any
    /// ranking problem falls back to the head of the working pool.
    pub async fn select_candidates<R: Rng + ?Sized + Send>(
        &self,
        pool: &[CandidateArticle],
        recent: &[RecentPost],
        max_count: usize,
        rng: &mut R,
    ) -> Vec<CandidateArticle> {
        let working = self.build_working_pool(pool, rng);
        if working.is_empty() || max_count == 0 {
            return Vec::new();
        }
        let breaking = working.iter().filter(|c| c.is_breaking()).count();
        info!(
            pool = pool.len(),
            working = working.len(),
            breaking,
            max_count,
            "ranking candidates"
        );

        let prompt = ranking_prompt(recent, &working, max_count);
        let ranked = match complete_within(self.llm.as_ref(), &prompt, self.cfg.ai_timeout).await
        {
            Ok(text) => match parse_ranked_list(&text) {
                Ok(entries) => resolve_ranked(&entries, &working, max_count),
                Err(e) => {
                    warn!(error = %e, "could not parse ranking response");
                    Vec::new()
                }
            },
            Err(e) => {
                warn!(error = %e, provider = self.llm.provider_name(), "ranking call failed");
                Vec::new()
            }
        };

        if ranked.is_empty() {
            warn!("falling back to working pool order");
            return fallback(working, max_count);
        }
        info!(selected = ranked.len(), "ranked candidates ready");
        ranked
    }
}

fn fallback(mut working: Vec<CandidateArticle>, max_count: usize) -> Vec<CandidateArticle> {
    working.truncate(max_count);
    working
}

/// Map ranked entries back onto the working pool by exact URL. Unknown URLs are dropped,
/// as are repeats of a `feed_id` already taken.
pub fn resolve_ranked(
    entries: &[RankedEntry],
    working: &[CandidateArticle],
    max_count: usize,
) -> Vec<CandidateArticle> {
    let by_url: HashMap<&str, &CandidateArticle> =
        working.iter().map(|c| (c.url.as_str(), c)).collect();
    let mut taken = HashSet::new();
    let mut out = Vec::new();
    for e in entries {
        if out.len() >= max_count {
            break;
        }
        match by_url.get(e.url.as_str()) {
            Some(c) if taken.insert(c.feed_id) => out.push((*c).clone()),
            Some(_) => {}
            None => debug!(url = %e.url, "ranked url not in working pool, dropping"),
        }
    }
    out
}

pub fn ranking_prompt(
    recent: &[RecentPost],
    working: &[CandidateArticle],
    max_count: usize,
) -> String {
    let recent_titles = recent
        .iter()
        .filter_map(|p| p.title.as_deref().filter(|t| !t.trim().is_empty()))
        .map(|t| format!("- {t}"))
        .collect::<Vec<_>>()
        .join("\n");
    let candidates = working
        .iter()
        .map(|c| format!("- {} ({})", c.title, c.url))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Select the {max_count} most newsworthy articles from the candidates below that:\n\
1. Have significant public interest or impact\n\
2. Represent meaningful developments rather than speculation\n\
3. Cover diverse topics and do not repeat the recent posts\n\
\n\
Exclude:\n\
- sensationalism and clickbait\n\
- press releases and corporate announcements\n\
- government or military websites\n\
- celebrity, sports and entertainment news unless of major public impact\n\
- obituaries unless of major public figures\n\
- promotions of financial products and pure sales events\n\
\n\
Recent posts:\n{recent_titles}\n\
\n\
Candidates:\n{candidates}\n\
\n\
Return ONLY the URLs and titles in this format, most important first:\n\
1. URL: [first URL]\n   TITLE: [first title]\n\
2. URL: [second URL]\n   TITLE: [second title]\n"
    )
}
