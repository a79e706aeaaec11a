// src/similarity.rs
//! Two-tier duplicate check against recently published posts.
//!
//! Tier 1 compares title keywords locally and short-circuits on a clear overlap.
//! Tier 2 asks the LLM for a SIMILAR/DIFFERENT verdict. Any LLM failure counts as
//! DIFFERENT so an AI outage never blocks publishing.

use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::ai::parse::parse_similarity_verdict;
use crate::ai::{complete_within, DynLlm};
use crate::config::Settings;
use crate::model::RecentPost;

#[derive(Debug, Clone)]
pub struct SimilarityConfig {
    /// How many of the most recent posts to compare against.
    pub posts_limit: usize,
    pub min_keyword_length: usize,
    /// Overlap ratio that must be exceeded (strictly) to call it a duplicate.
    pub threshold: f64,
    /// Prefix of the article body sent to the LLM.
    pub text_chars: usize,
    pub ai_timeout: Duration,
}

impl SimilarityConfig {
    pub fn from_settings(s: &Settings) -> Self {
        Self {
            posts_limit: s.similarity_posts_limit,
            min_keyword_length: s.min_keyword_length,
            threshold: s.similarity_threshold,
            text_chars: s.similarity_text_chars,
            ai_timeout: Duration::from_secs(s.ai.timeout_secs),
        }
    }
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Lowercased words of `text` with punctuation removed, keeping only tokens of at least
/// `min_len` characters.
pub fn significant_tokens(text: &str, min_len: usize) -> HashSet<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '_')
        .collect();
    cleaned
        .split_whitespace()
        .filter(|w| w.chars().count() >= min_len)
        .map(str::to_string)
        .collect()
}

/// `|a ∩ b| / min(|a|, |b|)`, or `None` when either side is empty.
pub fn overlap_ratio(a: &HashSet<String>, b: &HashSet<String>) -> Option<f64> {
    let denom = a.len().min(b.len());
    if denom == 0 {
        return None;
    }
    Some(a.intersection(b).count() as f64 / denom as f64)
}

pub struct SimilarityChecker {
    llm: DynLlm,
    cfg: SimilarityConfig,
}

impl SimilarityChecker {
    pub fn new(llm: DynLlm, cfg: SimilarityConfig) -> Self {
        Self { llm, cfg }
    }

    /// The `posts_limit` newest posts, newest first.
    fn window<'a>(&self, recent: &'a [RecentPost]) -> Vec<&'a RecentPost> {
        let mut posts: Vec<&RecentPost> = recent.iter().collect();
        posts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        posts.truncate(self.cfg.posts_limit);
        posts
    }

    /// Tier 1 only: the first recent post whose title overlaps enough, with its ratio.
    pub fn keyword_match<'a>(
        &self,
        title: &str,
        recent: &'a [RecentPost],
    ) -> Option<(&'a RecentPost, f64)> {
        let candidate = significant_tokens(title, self.cfg.min_keyword_length);
        if candidate.is_empty() {
            return None;
        }
        for post in self.window(recent) {
            let Some(post_title) = post.title.as_deref() else {
                continue;
            };
            let tokens = significant_tokens(post_title, self.cfg.min_keyword_length);
            match overlap_ratio(&candidate, &tokens) {
                Some(r) if r > self.cfg.threshold => return Some((post, r)),
                _ => {}
            }
        }
        None
    }

    pub async fn is_similar(&self, title: &str, text: &str, recent: &[RecentPost]) -> bool {
        if recent.is_empty() {
            return false;
        }
        if let Some((post, ratio)) = self.keyword_match(title, recent) {
            info!(
                title,
                recent_title = post.title.as_deref().unwrap_or_default(),
                ratio,
                "title keyword overlap"
            );
            return true;
        }

        let prompt = self.similarity_prompt(title, text, recent);
        match complete_within(self.llm.as_ref(), &prompt, self.cfg.ai_timeout).await {
            Ok(answer) => {
                let similar = parse_similarity_verdict(&answer);
                debug!(title, similar, "AI similarity verdict");
                similar
            }
            Err(e) => {
                warn!(title, error = %e, "similarity check failed, treating as different");
                false
            }
        }
    }

    fn similarity_prompt(&self, title: &str, text: &str, recent: &[RecentPost]) -> String {
        let excerpt: String = text.chars().take(self.cfg.text_chars).collect();
        let recent_titles = self
            .window(recent)
            .into_iter()
            .filter_map(|p| match p.title.as_deref() {
                Some(t) if !t.trim().is_empty() => Some(format!("Title: {t}")),
                _ if !p.text.trim().is_empty() => {
                    Some(format!("Post: {}", p.text.chars().take(140).collect::<String>()))
                }
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "Compare this new article with recent posts. Are they about the same news event?\n\
\n\
New article:\n\
Title: {title}\n\
Text: {excerpt}...\n\
\n\
Recent posts:\n{recent_titles}\n\
\n\
Return ONLY 'SIMILAR' if they cover the same specific news event, otherwise 'DIFFERENT'."
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::LlmClient;
    use crate::error::AiError;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counting {
        reply: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl LlmClient for Counting {
        fn complete<'a>(
            &'a self,
            _prompt: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<String, AiError>> + Send + 'a>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let res = self.reply.map(str::to_string).ok_or(AiError::Status(500));
            Box::pin(async move { res })
        }
        fn provider_name(&self) -> &'static str {
            "counting"
        }
    }

    fn post(title: &str, minutes_ago: i64) -> RecentPost {
        RecentPost {
            text: format!("{title} https://x.y"),
            url: None,
            title: Some(title.to_string()),
            timestamp: Utc::now() - ChronoDuration::minutes(minutes_ago),
        }
    }

    fn checker(reply: Option<&'static str>) -> (SimilarityChecker, Arc<Counting>) {
        let llm = Arc::new(Counting {
            reply,
            calls: AtomicUsize::new(0),
        });
        (
            SimilarityChecker::new(llm.clone(), SimilarityConfig::default()),
            llm,
        )
    }

    #[test]
    fn tokens_drop_punctuation_and_short_words() {
        let t = significant_tokens("U.S. Senate passes $1B aid bill, 70-30!", 3);
        let mut v: Vec<_> = t.into_iter().collect();
        v.sort();
        assert_eq!(v, vec!["7030", "aid", "bill", "passes", "senate"]);
    }

    #[test]
    fn ratio_uses_smaller_set_and_skips_empty() {
        let a = significant_tokens("senate passes budget bill", 3);
        let b = significant_tokens("budget bill", 3);
        assert_eq!(overlap_ratio(&a, &b), Some(1.0));
        assert_eq!(overlap_ratio(&a, &HashSet::new()), None);
    }

    #[tokio::test]
    async fn keyword_overlap_short_circuits_llm() {
        let (c, llm) = checker(Some("DIFFERENT"));
        let recent = vec![post("Earthquake strikes central Japan coast", 10)];
        let similar = c
            .is_similar("Strong earthquake strikes Japan", "body", &recent)
            .await;
        assert!(similar);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn llm_error_fails_open() {
        let (c, llm) = checker(None);
        let recent = vec![post("Central bank holds rates", 5)];
        assert!(!c.is_similar("Volcano erupts in Iceland", "lava", &recent).await);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn llm_verdict_decides_when_keywords_differ() {
        let (c, _) = checker(Some(" similar\n"));
        let recent = vec![post("Central bank holds rates", 5)];
        assert!(c.is_similar("Fed keeps borrowing costs unchanged", "", &recent).await);
    }

    #[tokio::test]
    async fn only_newest_posts_are_compared() {
        let (mut c, _) = checker(Some("DIFFERENT"));
        c.cfg.posts_limit = 1;
        let recent = vec![
            post("Earthquake strikes central Japan coast", 600),
            post("Markets rally on tech earnings", 1),
        ];
        assert!(c.keyword_match("Earthquake strikes Japan coast", &recent).is_none());
    }

    #[tokio::test]
    async fn no_recent_posts_means_different() {
        let (c, llm) = checker(Some("SIMILAR"));
        assert!(!c.is_similar("Anything", "", &[]).await);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }
}
