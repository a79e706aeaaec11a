// src/ai/parse.rs
//! Response parsers: raw model text in, structured data or an explicit parse failure out.
//! Kept free of any client so fallbacks can be tested without a model.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("no ranked entries found in response")]
    NoEntries,
    #[error("response is missing the {0} line")]
    MissingField(&'static str),
}

/// One `URL:` / `TITLE:` pair from a ranking response, in response order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedEntry {
    pub url: String,
    pub title: String,
}

static RE_ITEM_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*\d+\s*[.)]\s*(?:\*\*)?URL:?(?:\*\*)?\s*(.*)$").unwrap());
static RE_TITLE_INLINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(.*?)\s+(?:\*\*)?TITLE:(?:\*\*)?\s*(.*)$").unwrap());
static RE_TITLE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(?:[-*]\s*)?(?:\*\*)?TITLE:(?:\*\*)?\s*(.*)$").unwrap());

/// Parse a numbered list of
/// ```text
/// 1. URL: https://...
///    TITLE: ...
/// ```
/// Items without a usable URL are dropped. Titles may be empty.
pub fn parse_ranked_list(text: &str) -> Result<Vec<RankedEntry>, ParseError> {
    let mut out: Vec<RankedEntry> = Vec::new();
    let mut pending: Option<RankedEntry> = None;

    for line in text.lines() {
        if let Some(caps) = RE_ITEM_START.captures(line) {
            if let Some(done) = pending.take() {
                out.push(done);
            }
            let rest = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let (url, title) = match RE_TITLE_INLINE.captures(rest) {
                Some(c) => (c[1].to_string(), c[2].to_string()),
                None => (rest.to_string(), String::new()),
            };
            pending = Some(RankedEntry {
                url: clean_url(&url),
                title: clean_title(&title),
            });
            continue;
        }
        if let (Some(entry), Some(caps)) = (pending.as_mut(), RE_TITLE_LINE.captures(line)) {
            if entry.title.is_empty() {
                entry.title = clean_title(&caps[1]);
            }
        }
    }
    if let Some(done) = pending.take() {
        out.push(done);
    }

    out.retain(|e| e.url.starts_with("http://") || e.url.starts_with("https://"));
    if out.is_empty() {
        Err(ParseError::NoEntries)
    } else {
        Ok(out)
    }
}

fn clean_url(raw: &str) -> String {
    let t = raw.trim();
    // markdown link: [text](url)
    if let (Some(open), true) = (t.find("]("), t.ends_with(')')) {
        return t[open + 2..t.len() - 1].trim().to_string();
    }
    t.trim_matches(|c: char| matches!(c, '<' | '>' | '[' | ']' | '(' | ')' | '"' | '\'' | '*' | '`'))
        .trim()
        .to_string()
}

fn clean_title(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c: char| matches!(c, '"' | '*' | '`'))
        .trim()
        .to_string()
}

/// `SIMILAR` (after trim + uppercase) means duplicate; anything else means different.
pub fn parse_similarity_verdict(text: &str) -> bool {
    text.trim().to_uppercase() == "SIMILAR"
}

/// Fields of a generation response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedParts {
    pub post: String,
    pub summary: String,
    pub hashtags: Vec<String>,
}

/// Parse `TWEET:` (or `POST:`), `SUMMARY:` and optional `HASHTAGS:` lines.
pub fn parse_generated_post(text: &str) -> Result<GeneratedParts, ParseError> {
    let mut post = None;
    let mut summary = None;
    let mut hashtags = Vec::new();

    for line in text.lines() {
        let line = line.trim().trim_start_matches("**");
        if let Some(v) = strip_label(line, "TWEET:").or_else(|| strip_label(line, "POST:")) {
            post.get_or_insert_with(|| v.to_string());
        } else if let Some(v) = strip_label(line, "SUMMARY:") {
            summary.get_or_insert_with(|| v.to_string());
        } else if let Some(v) = strip_label(line, "HASHTAGS:") {
            hashtags = v
                .split(|c: char| c == ',' || c.is_whitespace())
                .map(|t| t.trim().trim_start_matches('#'))
                .filter(|t| !t.is_empty() && t.chars().all(|c| c.is_alphanumeric() || c == '_'))
                .map(|t| t.to_string())
                .collect();
        }
    }

    let post = post
        .filter(|p| !p.is_empty())
        .ok_or(ParseError::MissingField("TWEET"))?;
    let summary = summary
        .filter(|s| !s.is_empty())
        .ok_or(ParseError::MissingField("SUMMARY"))?;
    Ok(GeneratedParts {
        post,
        summary,
        hashtags,
    })
}

fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let head = line.get(..label.len())?;
    if head.eq_ignore_ascii_case(label) {
        Some(line[label.len()..].trim_start_matches("**").trim())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranked_list_multiline_format() {
        let text = "1. URL: https://a.com/1\n   TITLE: First story\n2. URL: https://b.com/2\n   TITLE: Second story\n";
        let out = parse_ranked_list(text).unwrap();
        assert_eq!(
            out,
            vec![
                RankedEntry {
                    url: "https://a.com/1".into(),
                    title: "First story".into()
                },
                RankedEntry {
                    url: "https://b.com/2".into(),
                    title: "Second story".into()
                },
            ]
        );
    }

    #[test]
    fn ranked_list_tolerates_markdown_and_inline_titles() {
        let text = "Here you go:\n1. **URL:** <https://a.com/x>\n   **TITLE:** Quake hits\n2) URL: [link](https://b.com/y) TITLE: Vote passes";
        let out = parse_ranked_list(text).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].url, "https://a.com/x");
        assert_eq!(out[0].title, "Quake hits");
        assert_eq!(out[1].url, "https://b.com/y");
        assert_eq!(out[1].title, "Vote passes");
    }

    #[test]
    fn ranked_list_without_entries_is_an_error() {
        assert_eq!(
            parse_ranked_list("I cannot help with that."),
            Err(ParseError::NoEntries)
        );
        assert_eq!(
            parse_ranked_list("1. URL: not-a-link\n TITLE: x"),
            Err(ParseError::NoEntries)
        );
    }

    #[test]
    fn similarity_verdict_is_exact() {
        assert!(parse_similarity_verdict("  similar \n"));
        assert!(!parse_similarity_verdict("DIFFERENT"));
        assert!(!parse_similarity_verdict("SIMILAR, because both cover the vote"));
    }

    #[test]
    fn generated_post_fields() {
        let text = "TWEET: Parliament passes budget after all-night session.\nSUMMARY: The budget passed.\nHASHTAGS: #Budget, Politics #bad-tag";
        let g = parse_generated_post(text).unwrap();
        assert_eq!(g.post, "Parliament passes budget after all-night session.");
        assert_eq!(g.summary, "The budget passed.");
        assert_eq!(g.hashtags, vec!["Budget", "Politics"]);
    }

    #[test]
    fn generated_post_requires_both_lines() {
        assert_eq!(
            parse_generated_post("SUMMARY: only this"),
            Err(ParseError::MissingField("TWEET"))
        );
        assert_eq!(
            parse_generated_post("POST: text only"),
            Err(ParseError::MissingField("SUMMARY"))
        );
    }
}
