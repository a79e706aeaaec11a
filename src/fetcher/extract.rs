// src/fetcher/extract.rs
//! HTML -> article fields. Pure functions over a parsed document, no I/O.

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use url::Url;

/// Fields pulled out of one article page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    pub title: String,
    pub text: String,
    pub description: Option<String>,
    pub top_image: Option<String>,
    /// `<link rel="canonical">` or `og:url`, absolute.
    pub canonical: Option<String>,
}

fn sel(s: &str) -> Selector {
    Selector::parse(s).unwrap_or_else(|e| panic!("static selector {s:?}: {e}"))
}

static TITLE_META: Lazy<Selector> =
    Lazy::new(|| sel("meta[property='og:title'], meta[name='twitter:title']"));
static TITLE: Lazy<Selector> = Lazy::new(|| sel("title"));
static H1: Lazy<Selector> = Lazy::new(|| sel("h1"));
static DESCRIPTION: Lazy<Selector> = Lazy::new(|| {
    sel("meta[property='og:description'], meta[name='description'], meta[name='twitter:description']")
});
static IMAGE_META: Lazy<Selector> = Lazy::new(|| {
    sel("meta[property='og:image'], meta[property='og:image:url'], meta[name='twitter:image']")
});
static IMAGE_BODY: Lazy<Selector> =
    Lazy::new(|| sel("article img, .featured-image img, figure img"));
static CANONICAL: Lazy<Selector> =
    Lazy::new(|| sel("link[rel='canonical'], meta[property='og:url']"));
static CONTAINERS: Lazy<Vec<Selector>> = Lazy::new(|| {
    [
        "article",
        "[itemprop='articleBody']",
        ".article-content",
        "#article-body",
        "main",
    ]
    .iter()
    .map(|s| sel(s))
    .collect()
});
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| sel("p"));

const MIN_PARAGRAPH_CHARS: usize = 20;

pub fn extract(html: &str, base: &Url) -> Extracted {
    let doc = Html::parse_document(html);

    let title = first_attr(&doc, &TITLE_META, "content")
        .or_else(|| first_text(&doc, &TITLE))
        .or_else(|| first_text(&doc, &H1))
        .unwrap_or_default();

    let top_image = first_attr(&doc, &IMAGE_META, "content")
        .or_else(|| {
            doc.select(&IMAGE_BODY)
                .filter_map(|el| el.value().attr("src").or_else(|| el.value().attr("data-src")))
                .map(str::trim)
                .find(|s| !s.is_empty() && !s.starts_with("data:"))
                .map(str::to_string)
        })
        .and_then(|src| absolutize(base, &src));

    let canonical = doc
        .select(&CANONICAL)
        .filter_map(|el| el.value().attr("href").or_else(|| el.value().attr("content")))
        .find_map(|href| absolutize(base, href));

    Extracted {
        title,
        text: body_text(&doc),
        description: first_attr(&doc, &DESCRIPTION, "content"),
        top_image,
        canonical,
    }
}

/// Paragraphs of the first content container that has any, else every substantial `<p>`.
fn body_text(doc: &Html) -> String {
    for container in CONTAINERS.iter() {
        for root in doc.select(container) {
            let paras: Vec<String> = root
                .select(&PARAGRAPH)
                .map(|p| clean_text(&p.text().collect::<String>()))
                .filter(|t| t.chars().count() >= MIN_PARAGRAPH_CHARS)
                .collect();
            if !paras.is_empty() {
                return paras.join("\n\n");
            }
        }
    }
    doc.select(&PARAGRAPH)
        .map(|p| clean_text(&p.text().collect::<String>()))
        .filter(|t| t.chars().count() > MIN_PARAGRAPH_CHARS)
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn first_text(doc: &Html, s: &Selector) -> Option<String> {
    doc.select(s)
        .map(|el| clean_text(&el.text().collect::<String>()))
        .find(|t| !t.is_empty())
}

fn first_attr(doc: &Html, s: &Selector, attr: &str) -> Option<String> {
    doc.select(s)
        .filter_map(|el| el.value().attr(attr))
        .map(clean_text)
        .find(|t| !t.is_empty())
}

fn absolutize(base: &Url, href: &str) -> Option<String> {
    let joined = base.join(href.trim()).ok()?;
    matches!(joined.scheme(), "http" | "https").then(|| joined.to_string())
}

/// Decode leftover entities (double-escaped CMS output) and collapse whitespace.
pub fn clean_text(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// First matching phrase (lowercase) found anywhere in the raw page.
pub fn find_paywall_phrase<'a>(html: &str, phrases: &'a [String]) -> Option<&'a str> {
    let lower = html.to_lowercase();
    phrases
        .iter()
        .map(String::as_str)
        .find(|p| !p.is_empty() && lower.contains(p))
}

/// `limit` chars at most; longer input keeps `limit - 3` chars plus "...".
pub fn summarize(text: &str, limit: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let head: String = text.chars().take(limit.saturating_sub(3)).collect();
    format!("{}...", head.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_selectors_parse() {
        for s in [
            &TITLE_META,
            &TITLE,
            &H1,
            &DESCRIPTION,
            &IMAGE_META,
            &IMAGE_BODY,
            &CANONICAL,
            &PARAGRAPH,
        ] {
            Lazy::force(s);
        }
        assert!(!CONTAINERS.is_empty());
    }

    #[test]
    #[should_panic(expected = "static selector")]
    fn malformed_selector_names_the_literal() {
        sel("meta[property=");
    }

    fn base() -> Url {
        Url::parse("https://news.example.com/world/story").unwrap()
    }

    const PAGE: &str = r#"<html><head>
<title>Fallback title | Example News</title>
<meta property="og:title" content="Rivers rise across the region">
<meta name="description" content="Floodwaters rose overnight.">
<link rel="canonical" href="/world/story-canonical">
</head><body>
<nav><p>Home World Business Sports Opinion Weather</p></nav>
<article>
  <h1>Rivers rise</h1>
  <figure><img src="/img/flood.jpg"></figure>
  <p>Floodwaters rose overnight across three provinces, officials said.</p>
  <p>short</p>
  <p>Emergency crews evacuated more than &amp;amp; 2,000 residents by morning.</p>
</article>
</body></html>"#;

    #[test]
    fn extracts_title_body_image_and_canonical() {
        let e = extract(PAGE, &base());
        assert_eq!(e.title, "Rivers rise across the region");
        assert_eq!(
            e.text,
            "Floodwaters rose overnight across three provinces, officials said.\n\nEmergency crews evacuated more than & 2,000 residents by morning."
        );
        assert_eq!(e.description.as_deref(), Some("Floodwaters rose overnight."));
        assert_eq!(
            e.top_image.as_deref(),
            Some("https://news.example.com/img/flood.jpg")
        );
        assert_eq!(
            e.canonical.as_deref(),
            Some("https://news.example.com/world/story-canonical")
        );
    }

    #[test]
    fn og_image_wins_over_body_images() {
        let html = r#"<head><meta property="og:image" content="https://cdn.example.com/a.jpg"></head>
<body><article><img src="/b.jpg"></article></body>"#;
        assert_eq!(
            extract(html, &base()).top_image.as_deref(),
            Some("https://cdn.example.com/a.jpg")
        );
    }

    #[test]
    fn paywall_phrase_is_case_insensitive() {
        let phrases = vec!["subscribe".to_string(), "sign in".to_string()];
        assert_eq!(
            find_paywall_phrase("<div>Please SIGN IN to continue</div>", &phrases),
            Some("sign in")
        );
        assert_eq!(find_paywall_phrase("<p>free</p>", &phrases), None);
    }

    #[test]
    fn summary_truncates_to_limit() {
        let long = "x".repeat(150);
        let s = summarize(&long, 100);
        assert_eq!(s.chars().count(), 100);
        assert!(s.ends_with("..."));
        assert_eq!(summarize("short one", 100), "short one");
    }
}
