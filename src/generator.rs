// src/generator.rs
//! Turns a scraped article into post text, a one-line summary and hashtag facets.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::ai::parse::{parse_generated_post, ParseError};
use crate::ai::{complete_within, DynLlm};
use crate::config::Settings;
use crate::error::AiError;
use crate::model::{GeneratedPost, HashtagFacet};

const MAX_HASHTAGS: usize = 3;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Ai(#[from] AiError),
    #[error("unusable generation response: {0}")]
    Parse(#[from] ParseError),
}

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub text_chars: usize,
    pub post_char_limit: usize,
    pub ai_timeout: Duration,
}

impl GeneratorConfig {
    pub fn from_settings(s: &Settings) -> Self {
        Self {
            text_chars: s.generation_text_chars,
            post_char_limit: s.post_char_limit,
            ai_timeout: Duration::from_secs(s.ai.timeout_secs),
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

pub struct ContentGenerator {
    llm: DynLlm,
    cfg: GeneratorConfig,
}

impl ContentGenerator {
    pub fn new(llm: DynLlm, cfg: GeneratorConfig) -> Self {
        Self { llm, cfg }
    }

    pub async fn generate(
        &self,
        article_text: &str,
        title: &str,
        url: &str,
    ) -> Result<GeneratedPost, GenerationError> {
        let prompt = self.prompt(article_text, title, url);
        let raw = complete_within(self.llm.as_ref(), &prompt, self.cfg.ai_timeout).await?;
        let parts = parse_generated_post(&raw).map_err(|e| {
            let head: String = raw.chars().take(100).collect();
            warn!(title, response = %head, "could not parse generated post");
            e
        })?;

        let body = clamp_chars(&parts.post, self.cfg.post_char_limit);
        let (text, hashtags) = append_hashtags(&body, &parts.hashtags, self.cfg.post_char_limit);
        debug!(title, chars = text.chars().count(), tags = hashtags.len(), "post generated");
        Ok(GeneratedPost {
            text,
            summary: parts.summary,
            hashtags,
        })
    }

    fn prompt(&self, article_text: &str, title: &str, url: &str) -> String {
        let truncated: String = article_text.chars().take(self.cfg.text_chars).collect();
        let limit = self.cfg.post_char_limit;
        format!(
            "Create a brief, informative social media post for the following news article.\n\
\n\
Article Title: {title}\n\
Article URL: {url}\n\
Article Content: {truncated}\n\
\n\
Requirements:\n\
1. Be factual and objective, no editorializing or opinions\n\
2. Include only the most important information (who, what, where, when)\n\
3. No emojis and no hashtags inside the post text\n\
4. Keep it under {limit} characters\n\
5. Use neutral, straightforward language\n\
\n\
Format your response as:\n\
TWEET: [post text]\n\
SUMMARY: [one sentence summary of the article]\n\
HASHTAGS: [up to {MAX_HASHTAGS} relevant hashtags, space separated]"
        )
    }
}

/// Cut to `limit` chars at a word boundary, marking the cut with an ellipsis.
pub(crate) fn clamp_chars(text: &str, limit: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let head: String = text.chars().take(limit.saturating_sub(1)).collect();
    let cut = match head.rfind(char::is_whitespace) {
        Some(i) if i > 0 => head[..i].trim_end(),
        _ => head.as_str(),
    };
    format!("{cut}…")
}

/// Append `#tags` while the text stays within `limit` chars; facets index UTF-8 bytes.
pub fn append_hashtags(body: &str, tags: &[String], limit: usize) -> (String, Vec<HashtagFacet>) {
    let mut text = body.to_string();
    let mut facets = Vec::new();
    for tag in tags.iter().take(MAX_HASHTAGS) {
        let piece = format!(" #{tag}");
        if text.chars().count() + piece.chars().count() > limit {
            break;
        }
        if facets.iter().any(|f: &HashtagFacet| f.tag.eq_ignore_ascii_case(tag)) {
            continue;
        }
        let byte_start = text.len() + 1;
        text.push_str(&piece);
        facets.push(HashtagFacet {
            tag: tag.clone(),
            byte_start,
            byte_end: text.len(),
        });
    }
    (text, facets)
}
