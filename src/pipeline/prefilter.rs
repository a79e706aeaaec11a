// src/pipeline/prefilter.rs
//! Domain and title policy applied to the pool before selection and again to every
//! resolved URL.

use regex::Regex;
use tracing::warn;

use super::outcome::SkipReason;
use crate::config::DomainLists;
use crate::domain_filter::{
    compile_title_patterns, default_pr_patterns, extract_host, is_domain_match,
    is_government_or_military, is_press_release_title,
};
use crate::fetcher::is_redirect_url;
use crate::model::CandidateArticle;

#[derive(Debug, Clone)]
pub struct DomainPolicy {
    paywall_domains: Vec<String>,
    blocked_domains: Vec<String>,
    pr_patterns: Vec<Regex>,
    redirect_hosts: Vec<String>,
}

impl DomainPolicy {
    /// Configured PR patterns replace the built-in set; none configured means built-ins.
    pub fn new(lists: &DomainLists, redirect_hosts: &[String]) -> Self {
        let pr_patterns = if lists.pr_title_patterns.is_empty() {
            default_pr_patterns().to_vec()
        } else {
            compile_title_patterns(&lists.pr_title_patterns)
        };
        Self {
            paywall_domains: lists.paywall_domains.clone(),
            blocked_domains: lists.blocked_domains.clone(),
            pr_patterns,
            redirect_hosts: redirect_hosts.to_vec(),
        }
    }

    pub fn is_redirect(&self, url: &str) -> bool {
        is_redirect_url(url, &self.redirect_hosts)
    }

    /// Checks on a concrete article URL. An unparseable URL is rejected.
    pub fn check_url(&self, url: &str) -> Option<SkipReason> {
        if extract_host(url).is_none() {
            Some(SkipReason::UnparseableUrl)
        } else if is_domain_match(url, &self.blocked_domains) {
            Some(SkipReason::BlockedDomain)
        } else if is_government_or_military(url) {
            Some(SkipReason::GovernmentDomain)
        } else if is_domain_match(url, &self.paywall_domains) {
            Some(SkipReason::PaywallDomain)
        } else {
            None
        }
    }

    /// Pre-selection check. Redirect URLs defer their domain checks until resolution.
    pub fn check_candidate(&self, c: &CandidateArticle) -> Option<SkipReason> {
        if is_press_release_title(&c.title, &self.pr_patterns) {
            return Some(SkipReason::PressRelease);
        }
        if self.is_redirect(&c.url) {
            return None;
        }
        self.check_url(&c.url)
    }

    pub fn filter_pool(&self, pool: Vec<CandidateArticle>) -> Vec<CandidateArticle> {
        pool.into_iter()
            .filter(|c| match self.check_candidate(c) {
                Some(reason) => {
                    warn!(
                        title = %c.title,
                        url = %c.url,
                        reason = reason.code(),
                        "dropping candidate before selection"
                    );
                    metrics::counter!("pipeline_prefilter_drops_total", "reason" => reason.code())
                        .increment(1);
                    false
                }
                None => true,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> DomainPolicy {
        let lists = DomainLists {
            paywall_domains: vec!["wsj.com".into()],
            blocked_domains: vec!["apple.com".into()],
            ..Default::default()
        };
        DomainPolicy::new(&lists, &["news.google.com".to_string()])
    }

    fn c(url: &str, title: &str) -> CandidateArticle {
        CandidateArticle::new(1, url, title)
    }

    #[test]
    fn url_checks_in_order() {
        let p = policy();
        assert_eq!(p.check_url("https://www.apple.com/newsroom"), Some(SkipReason::BlockedDomain));
        assert_eq!(p.check_url("https://www.nasa.gov/x"), Some(SkipReason::GovernmentDomain));
        assert_eq!(p.check_url("https://markets.wsj.com/x"), Some(SkipReason::PaywallDomain));
        assert_eq!(p.check_url("https://evil.com/wsj.com"), None);
        assert_eq!(p.check_url("::nonsense"), Some(SkipReason::UnparseableUrl));
    }

    #[test]
    fn redirect_candidates_wait_for_resolution() {
        let p = policy();
        assert_eq!(p.check_candidate(&c("https://news.google.com/rss/articles/x", "Quake")), None);
        assert_eq!(
            p.check_candidate(&c("https://news.google.com/rss/articles/x", "Press release: new CFO")),
            Some(SkipReason::PressRelease)
        );
    }

    #[test]
    fn pool_filter_keeps_clean_candidates() {
        let pool = vec![
            c("https://reuters.com/a", "Quake hits coast"),
            c("https://wsj.com/b", "Markets slide"),
            c("https://defense.mil/c", "Exercise ends"),
        ];
        let kept = policy().filter_pool(pool);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].url, "https://reuters.com/a");
    }
}
