// tests/common/mod.rs
// In-memory stand-ins for every collaborator the pipeline talks to.
#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use news_poster::ai::{DynLlm, LlmClient};
use news_poster::config::DomainLists;
use news_poster::error::{AiError, ArticleError, DatabaseError, SocialError};
use news_poster::fetcher::ArticleFetcher;
use news_poster::generator::{ContentGenerator, GeneratorConfig};
use news_poster::history::UrlHistory;
use news_poster::pipeline::DomainPolicy;
use news_poster::publish::{DynPublisher, PostRequest, Publisher};
use news_poster::repository::{FeedRepository, UsageRecord};
use news_poster::selector::{CandidateSelector, SelectorConfig};
use news_poster::similarity::{SimilarityChecker, SimilarityConfig};
use news_poster::{
    CandidateArticle, Collaborators, Pipeline, PipelineOptions, Platform, PublishedArticle,
    RecentPost,
};

// ------------------------------------------------------------------
// LLM
// ------------------------------------------------------------------

/// Answers by prompt kind: ranking, similarity or generation.
#[derive(Default)]
pub struct ScriptedLlm {
    /// Ranking answer; `None` makes the ranking call fail.
    pub ranking: Option<String>,
    /// Titles the similarity check should call duplicates.
    pub similar_titles: Vec<String>,
    pub calls: Mutex<Vec<&'static str>>,
}

impl ScriptedLlm {
    pub fn count(&self, kind: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|k| **k == kind).count()
    }

    fn answer(&self, prompt: &str) -> Result<String, AiError> {
        if prompt.starts_with("Select the") {
            self.calls.lock().unwrap().push("rank");
            return self.ranking.clone().ok_or(AiError::Status(503));
        }
        if prompt.starts_with("Compare this new article") {
            self.calls.lock().unwrap().push("similar");
            let new_title = prompt
                .lines()
                .skip_while(|l| !l.starts_with("New article:"))
                .nth(1)
                .unwrap_or_default();
            let dup = self
                .similar_titles
                .iter()
                .any(|t| new_title == format!("Title: {t}"));
            return Ok(if dup { "SIMILAR" } else { "DIFFERENT" }.to_string());
        }
        self.calls.lock().unwrap().push("generate");
        let title = prompt
            .lines()
            .find_map(|l| l.strip_prefix("Article Title: "))
            .unwrap_or("news");
        Ok(format!(
            "TWEET: Latest: {title}\nSUMMARY: One line about {title}.\nHASHTAGS: #News"
        ))
    }
}

impl LlmClient for ScriptedLlm {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, AiError>> + Send + 'a>> {
        let out = self.answer(prompt);
        Box::pin(async move { out })
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

// ------------------------------------------------------------------
// Feed repository
// ------------------------------------------------------------------

#[derive(Default)]
pub struct FakeRepo {
    pub pool: Vec<CandidateArticle>,
    pub fail: bool,
    pub marked: Mutex<Vec<(i64, Platform)>>,
}

impl FakeRepo {
    pub fn with_pool(pool: Vec<CandidateArticle>) -> Self {
        Self {
            pool,
            ..Default::default()
        }
    }

    pub fn marked(&self) -> Vec<(i64, Platform)> {
        self.marked.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeedRepository for FakeRepo {
    async fn candidate_pool(&self) -> Result<Vec<CandidateArticle>, DatabaseError> {
        if self.fail {
            return Err(DatabaseError::Connection("connection refused".into()));
        }
        Ok(self.pool.clone())
    }

    async fn mark_used(&self, record: &UsageRecord<'_>) -> Result<bool, DatabaseError> {
        self.marked
            .lock()
            .unwrap()
            .push((record.feed_id, record.platform));
        Ok(true)
    }
}

// ------------------------------------------------------------------
// Article fetcher
// ------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub enum FetchFailure {
    Paywall,
    Network,
    TooShort,
}

/// Every URL fetches fine unless listed in `failures`. Redirect URLs resolve through
/// `redirects` (a missing entry or `None` means unresolvable).
#[derive(Default)]
pub struct FakeFetcher {
    pub failures: HashMap<String, FetchFailure>,
    pub redirects: HashMap<String, Option<String>>,
    pub fetched: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn fail(mut self, url: &str, how: FetchFailure) -> Self {
        self.failures.insert(url.to_string(), how);
        self
    }

    pub fn redirect(mut self, from: &str, to: Option<&str>) -> Self {
        self.redirects
            .insert(from.to_string(), to.map(str::to_string));
        self
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArticleFetcher for FakeFetcher {
    async fn resolve_redirect(&self, url: &str) -> Option<String> {
        self.redirects.get(url).cloned().flatten()
    }

    async fn fetch_article(
        &self,
        url: &str,
        feed_id: i64,
    ) -> Result<PublishedArticle, ArticleError> {
        self.fetched.lock().unwrap().push(url.to_string());
        match self.failures.get(url) {
            Some(FetchFailure::Paywall) => Err(ArticleError::Paywall { url: url.into() }),
            Some(FetchFailure::Network) => Err(ArticleError::Fetch {
                url: url.into(),
                message: "connection reset".into(),
            }),
            Some(FetchFailure::TooShort) => Err(ArticleError::InsufficientContent {
                url: url.into(),
                words: 12,
                min: 50,
            }),
            None => Ok(PublishedArticle {
                url: url.to_string(),
                title: format!("Article {feed_id}"),
                text: "Officials confirmed the details on Tuesday. ".repeat(20),
                summary: "Officials confirmed the details.".into(),
                top_image: None,
                feed_id,
            }),
        }
    }
}

// ------------------------------------------------------------------
// Publisher
// ------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishBehavior {
    Accept,
    Reject,
    SessionLost,
}

pub struct FakePublisher {
    pub platform: Platform,
    pub auth_ok: bool,
    pub behavior: PublishBehavior,
    pub recent: Vec<RecentPost>,
    pub published: Mutex<Vec<String>>,
}

impl FakePublisher {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            auth_ok: true,
            behavior: PublishBehavior::Accept,
            recent: vec![recent_post("Gardening tips for a dry spring")],
            published: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_auth(mut self) -> Self {
        self.auth_ok = false;
        self
    }

    pub fn behaving(mut self, behavior: PublishBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn published(&self) -> Vec<String> {
        self.published.lock().unwrap().clone()
    }
}

fn platform_name(p: Platform) -> &'static str {
    p.as_str()
}

#[async_trait]
impl Publisher for FakePublisher {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn authenticate(&self) -> Result<(), SocialError> {
        if self.auth_ok {
            Ok(())
        } else {
            Err(SocialError::Authentication {
                platform: platform_name(self.platform),
                message: "invalid credentials".into(),
            })
        }
    }

    async fn recent_posts(&self, limit: usize) -> Result<Vec<RecentPost>, SocialError> {
        Ok(self.recent.iter().take(limit).cloned().collect())
    }

    async fn publish(&self, post: &PostRequest<'_>) -> Result<Option<String>, SocialError> {
        match self.behavior {
            PublishBehavior::Accept => {
                self.published
                    .lock()
                    .unwrap()
                    .push(post.article_url.to_string());
                Ok(Some(format!("post-{}", self.published.lock().unwrap().len())))
            }
            PublishBehavior::Reject => Err(SocialError::Posting {
                platform: platform_name(self.platform),
                message: "HTTP 400: duplicate".into(),
            }),
            PublishBehavior::SessionLost => Err(SocialError::Authentication {
                platform: platform_name(self.platform),
                message: "token expired".into(),
            }),
        }
    }
}

// ------------------------------------------------------------------
// Builders
// ------------------------------------------------------------------

pub fn recent_post(title: &str) -> RecentPost {
    RecentPost {
        text: title.to_string(),
        url: None,
        title: Some(title.to_string()),
        timestamp: Utc::now(),
    }
}

/// Breaking candidates with strictly falling source counts keep their order through
/// selection when ranking falls back.
pub fn ordered_candidates(items: &[(&str, &str)]) -> Vec<CandidateArticle> {
    items
        .iter()
        .enumerate()
        .map(|(i, (url, title))| {
            CandidateArticle::new(i as i64 + 1, *url, *title).with_source_count(50 - i as u32)
        })
        .collect()
}

pub fn policy() -> DomainPolicy {
    let lists = DomainLists {
        paywall_domains: vec!["wsj.com".into()],
        blocked_domains: vec!["prnewswire.com".into()],
        ..Default::default()
    };
    DomainPolicy::new(&lists, &["news.google.com".to_string()])
}

pub struct Harness {
    pub repo: Arc<FakeRepo>,
    pub fetcher: Arc<FakeFetcher>,
    pub publishers: Vec<Arc<FakePublisher>>,
    pub llm: Arc<ScriptedLlm>,
}

impl Harness {
    pub fn new(repo: FakeRepo, fetcher: FakeFetcher, llm: ScriptedLlm) -> Self {
        Self {
            repo: Arc::new(repo),
            fetcher: Arc::new(fetcher),
            publishers: vec![Arc::new(FakePublisher::new(Platform::Bluesky))],
            llm: Arc::new(llm),
        }
    }

    pub fn with_publishers(mut self, publishers: Vec<FakePublisher>) -> Self {
        self.publishers = publishers.into_iter().map(Arc::new).collect();
        self
    }

    pub fn pipeline(&self, history: &Path, test_mode: bool) -> Pipeline {
        let llm: DynLlm = self.llm.clone();
        let publishers: Vec<DynPublisher> = self
            .publishers
            .iter()
            .map(|p| p.clone() as DynPublisher)
            .collect();
        let parts = Collaborators {
            repository: self.repo.clone(),
            fetcher: self.fetcher.clone(),
            publishers,
            selector: CandidateSelector::new(llm.clone(), SelectorConfig::default()),
            similarity: SimilarityChecker::new(llm.clone(), SimilarityConfig::default()),
            generator: ContentGenerator::new(llm, GeneratorConfig::default()),
            history: UrlHistory::new(history, 100, 10),
            policy: policy(),
        };
        let opts = PipelineOptions {
            max_article_retries: 30,
            recent_posts_limit: 60,
            test_mode,
        };
        Pipeline::new(parts, opts)
    }
}
