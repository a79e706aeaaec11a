// src/domain_filter.rs
//! Registrable-domain matching for paywall/block lists.
//!
//! Matching is exact on the computed base domain (`example.com`, `example.co.uk`).
//! Substring or suffix containment is never used: `evil.com/wsj.com`, `wsj.com.evil.com`
//! and `notwsj.com` must not match `wsj.com`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::net::IpAddr;
use url::{Host, Url};

/// Second-level labels under a country code that are registered like a TLD.
const COMPOUND_TLDS: &[&str] = &[
    "co.uk", "org.uk", "gov.uk", "ac.uk", "me.uk", "ltd.uk", "plc.uk", "net.uk", "sch.uk",
    "nhs.uk", "police.uk", "com.au", "net.au", "org.au", "edu.au", "gov.au", "asn.au", "id.au",
    "co.nz", "org.nz", "net.nz", "govt.nz", "ac.nz", "co.jp", "or.jp", "ne.jp", "ac.jp",
    "go.jp", "co.kr", "or.kr", "go.kr", "co.in", "net.in", "org.in", "gov.in", "ac.in",
    "co.za", "org.za", "gov.za", "com.br", "net.br", "org.br", "gov.br", "com.cn", "net.cn",
    "org.cn", "gov.cn", "com.hk", "org.hk", "gov.hk", "com.sg", "org.sg", "gov.sg", "com.tw",
    "org.tw", "gov.tw", "com.mx", "org.mx", "gob.mx", "com.ar", "gob.ar", "com.tr", "gov.tr",
    "co.il", "org.il", "gov.il", "com.my", "gov.my", "com.ph", "gov.ph", "com.pk", "gov.pk",
    "com.ng", "gov.ng", "co.ke", "go.ke", "com.eg", "gov.eg", "com.sa", "gov.sa", "co.th",
    "go.th", "com.vn", "gov.vn", "co.id", "go.id", "com.ua", "gov.ua", "com.pl", "gov.pl",
];

/// Host label suffixes of government and military sites.
const GOV_MIL_LABELS: &[&str] = &["gov", "mil", "gob", "govt", "go"];

/// Extract the lowercase host of `url`, or `None` when it does not parse.
pub fn extract_host(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    match parsed.host()? {
        Host::Domain(d) => Some(d.trim_end_matches('.').to_ascii_lowercase()),
        Host::Ipv4(ip) => Some(ip.to_string()),
        Host::Ipv6(ip) => Some(ip.to_string()),
    }
}

/// Registrable base domain of `url`. Literal IP hosts are returned verbatim.
pub fn extract_base_domain(url: &str) -> Option<String> {
    let host = extract_host(url)?;
    Some(base_domain_of_host(&host))
}

/// Base domain of an already-extracted host (port stripped, lowercase).
pub fn base_domain_of_host(host: &str) -> String {
    if host.parse::<IpAddr>().is_ok() {
        return host.to_string();
    }
    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    if labels.len() < 2 {
        return labels.join(".");
    }
    let last_two = labels[labels.len() - 2..].join(".");
    if labels.len() >= 3 && COMPOUND_TLDS.contains(&last_two.as_str()) {
        labels[labels.len() - 3..].join(".")
    } else {
        last_two
    }
}

/// True when the base domain of `url` equals one of `domains` (already normalized base domains).
/// Unparseable URLs never match; callers decide how conservative to be.
pub fn is_domain_match<S: AsRef<str>>(url: &str, domains: &[S]) -> bool {
    let Some(base) = extract_base_domain(url) else {
        return false;
    };
    domains
        .iter()
        .any(|d| d.as_ref().trim().eq_ignore_ascii_case(&base))
}

/// Government or military host: `.gov`, `.mil`, or `gov.<cc>` style compound suffixes.
pub fn is_government_or_military(url: &str) -> bool {
    let Some(host) = extract_host(url) else {
        return false;
    };
    if host.parse::<IpAddr>().is_ok() {
        return false;
    }
    let labels: Vec<&str> = host.split('.').collect();
    match labels.as_slice() {
        [.., tld] if *tld == "gov" || *tld == "mil" => true,
        [.., second, tld] if tld.len() == 2 => GOV_MIL_LABELS.contains(second),
        _ => false,
    }
}

static DEFAULT_PR_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile_title_patterns(&[
        r"^statement\s+(regarding|on|about)".to_string(),
        r"^announcement\s*:".to_string(),
        r"^press\s+release\s*:".to_string(),
        r"^media\s+(release|statement)".to_string(),
        r"\bannounces\s+(q[1-4]|quarterly|annual|fiscal)".to_string(),
        r"\breports\s+(q[1-4]|quarterly|annual|fiscal)".to_string(),
        r"\b(q[1-4]|quarterly|annual)\s+(results|earnings|revenue)".to_string(),
        r"investor\s+(update|call|presentation)".to_string(),
        r"^notice\s+of\s+".to_string(),
        r"shareholder\s+(meeting|letter|update)".to_string(),
    ])
});

/// Compile case-insensitive title patterns, skipping (and logging) invalid ones.
pub fn compile_title_patterns(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match Regex::new(&format!("(?i){p}")) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!(pattern = %p, error = %e, "ignoring invalid title pattern");
                None
            }
        })
        .collect()
}

pub fn default_pr_patterns() -> &'static [Regex] {
    &DEFAULT_PR_PATTERNS
}

pub fn is_press_release_title(title: &str, patterns: &[Regex]) -> bool {
    let t = title.trim();
    patterns.iter().any(|re| re.is_match(t))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_domain_handles_subdomains_ports_and_compound_tlds() {
        assert_eq!(
            extract_base_domain("https://www.news.bbc.co.uk/x").as_deref(),
            Some("bbc.co.uk")
        );
        assert_eq!(
            extract_base_domain("http://sub.wsj.com:8080/a?b=c").as_deref(),
            Some("wsj.com")
        );
        assert_eq!(
            extract_base_domain("http://10.0.0.1:9000/").as_deref(),
            Some("10.0.0.1")
        );
        assert_eq!(extract_base_domain("not a url"), None);
    }

    #[test]
    fn path_subdomain_and_suffix_tricks_do_not_match() {
        let list = ["wsj.com"];
        assert!(!is_domain_match("https://evil.com/wsj.com", &list));
        assert!(!is_domain_match("https://wsj.com.evil.com/story", &list));
        assert!(!is_domain_match("https://notwsj.com", &list));
        assert!(is_domain_match("https://sub.wsj.com", &list));
        assert!(is_domain_match("https://WSJ.com/a", &list));
    }

    #[test]
    fn malformed_url_never_matches() {
        assert!(!is_domain_match("::::", &["wsj.com"]));
        assert!(!is_domain_match("", &["wsj.com"]));
    }

    #[test]
    fn government_and_military_hosts() {
        assert!(is_government_or_military("https://www.defense.gov/News"));
        assert!(is_government_or_military("https://army.mil/"));
        assert!(is_government_or_military("https://www.gov.uk/guidance"));
        assert!(is_government_or_military("https://ministry.gob.mx/"));
        assert!(!is_government_or_military("https://govexec.com/"));
        assert!(!is_government_or_military("https://www.bbc.co.uk/"));
    }

    #[test]
    fn press_release_titles() {
        let pats = default_pr_patterns();
        assert!(is_press_release_title("Statement regarding the merger", pats));
        assert!(is_press_release_title("Acme Corp announces Q3 results", pats));
        assert!(is_press_release_title("PRESS RELEASE: new plant", pats));
        assert!(!is_press_release_title("Earthquake strikes coastal city", pats));
    }
}
