// src/pipeline/mod.rs
//! One curation run: load the pool, pick candidates, then try them strictly in order until
//! one gets published somewhere.
//!
//! Every declined candidate produces a [`SkipReason`]; only configuration, database and
//! "no platform left" failures abort the run.

pub mod outcome;
pub mod prefilter;

use std::sync::Arc;

use chrono::Utc;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use rand::Rng;
use tracing::{debug, error, info, warn};

pub use outcome::{Outcome, Posted, RunOutcome, SkipReason};
pub use prefilter::DomainPolicy;

use crate::config::Settings;
use crate::error::PipelineError;
use crate::fetcher::ArticleFetcher;
use crate::generator::ContentGenerator;
use crate::history::UrlHistory;
use crate::model::{CandidateArticle, Platform, RecentPost};
use crate::publish::{DynPublisher, PostRequest};
use crate::repository::{FeedRepository, UsageRecord};
use crate::selector::CandidateSelector;
use crate::similarity::SimilarityChecker;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "pipeline_skips_total",
            "Candidates passed over, labelled by reason."
        );
        describe_counter!(
            "pipeline_prefilter_drops_total",
            "Pool entries dropped by domain/title policy before selection."
        );
        describe_counter!("pipeline_runs_total", "Finished runs, labelled by outcome.");
        describe_counter!(
            "pipeline_publish_failures_total",
            "Per-platform publish failures."
        );
        describe_gauge!("pipeline_last_run_ts", "Unix ts when the last run started.");
    });
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub max_article_retries: usize,
    pub recent_posts_limit: usize,
    /// Generate but do not publish, mark or record history.
    pub test_mode: bool,
}

impl PipelineOptions {
    pub fn from_settings(s: &Settings, test_mode: bool) -> Self {
        Self {
            max_article_retries: s.max_article_retries,
            recent_posts_limit: s.recent_posts_limit,
            test_mode,
        }
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            max_article_retries: 30,
            recent_posts_limit: 60,
            test_mode: false,
        }
    }
}

/// Everything a run talks to.
pub struct Collaborators {
    pub repository: Arc<dyn FeedRepository>,
    pub fetcher: Arc<dyn ArticleFetcher>,
    pub publishers: Vec<DynPublisher>,
    pub selector: CandidateSelector,
    pub similarity: SimilarityChecker,
    pub generator: ContentGenerator,
    pub history: UrlHistory,
    pub policy: DomainPolicy,
}

pub struct Pipeline {
    parts: Collaborators,
    opts: PipelineOptions,
}

impl Pipeline {
    pub fn new(parts: Collaborators, opts: PipelineOptions) -> Self {
        Self { parts, opts }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.opts
    }

    pub async fn run<R: Rng + ?Sized + Send>(
        &self,
        rng: &mut R,
    ) -> Result<RunOutcome, PipelineError> {
        ensure_metrics_described();
        gauge!("pipeline_last_run_ts").set(Utc::now().timestamp() as f64);

        let result = self.run_inner(rng).await;
        let label = match &result {
            Ok(outcome) => outcome.label(),
            Err(_) => "fatal",
        };
        counter!("pipeline_runs_total", "outcome" => label).increment(1);
        result
    }

    async fn run_inner<R: Rng + ?Sized + Send>(
        &self,
        rng: &mut R,
    ) -> Result<RunOutcome, PipelineError> {
        let mut active = self.authenticate().await;
        if active.is_empty() && !self.opts.test_mode {
            return Err(PipelineError::NoPlatforms);
        }
        let recent = self.recent_posts(&active).await;

        let pool = self.parts.repository.candidate_pool().await?;
        let fetched = pool.len();
        let pool = self.parts.policy.filter_pool(pool);
        info!(fetched, kept = pool.len(), recent = recent.len(), "candidate pool loaded");
        if pool.is_empty() {
            info!("no candidates left after filtering");
            return Ok(RunOutcome::NothingToDo);
        }

        let candidates = self
            .parts
            .selector
            .select_candidates(&pool, &recent, self.opts.max_article_retries, rng)
            .await;
        if candidates.is_empty() {
            info!("selection returned no candidates");
            return Ok(RunOutcome::NothingToDo);
        }

        for (i, candidate) in candidates.iter().enumerate() {
            debug!(attempt = i + 1, title = %candidate.title, url = %candidate.url, "trying candidate");
            match self.attempt(candidate, &recent, &mut active).await {
                Outcome::Success(posted) => {
                    info!(
                        attempt = i + 1,
                        feed_id = posted.feed_id,
                        url = %posted.url,
                        platforms = ?posted.platforms,
                        "candidate posted"
                    );
                    return Ok(RunOutcome::Posted {
                        feed_id: posted.feed_id,
                        url: posted.url,
                        platforms: posted.platforms,
                    });
                }
                Outcome::Skip(SkipReason::AlreadyPosted) => {
                    info!(
                        attempt = i + 1,
                        title = %candidate.title,
                        url = %candidate.url,
                        reason = SkipReason::AlreadyPosted.code(),
                        "skipping candidate"
                    );
                    counter!("pipeline_skips_total", "reason" => SkipReason::AlreadyPosted.code())
                        .increment(1);
                }
                Outcome::Skip(reason) => {
                    warn!(
                        attempt = i + 1,
                        title = %candidate.title,
                        url = %candidate.url,
                        reason = reason.code(),
                        "skipping candidate"
                    );
                    counter!("pipeline_skips_total", "reason" => reason.code()).increment(1);
                }
                Outcome::Fatal(e) => {
                    error!(error = %e, title = %candidate.title, "run aborted");
                    return Err(e);
                }
            }
        }

        warn!(attempted = candidates.len(), "all candidates exhausted");
        Ok(RunOutcome::Exhausted {
            attempted: candidates.len(),
        })
    }

    /// Publishers whose session opened. The others sit out this run.
    async fn authenticate(&self) -> Vec<DynPublisher> {
        let mut active = Vec::with_capacity(self.parts.publishers.len());
        for p in &self.parts.publishers {
            match p.authenticate().await {
                Ok(()) => active.push(Arc::clone(p)),
                Err(e) => error!(platform = %p.platform(), error = %e, "authentication failed"),
            }
        }
        active
    }

    /// Snapshot taken once per run; a platform that cannot list its posts contributes none.
    async fn recent_posts(&self, active: &[DynPublisher]) -> Vec<RecentPost> {
        let mut recent = Vec::new();
        for p in active {
            match p.recent_posts(self.opts.recent_posts_limit).await {
                Ok(posts) => {
                    debug!(platform = %p.platform(), count = posts.len(), "recent posts loaded");
                    recent.extend(posts);
                }
                Err(e) => warn!(platform = %p.platform(), error = %e, "could not load recent posts"),
            }
        }
        recent
    }

    async fn attempt(
        &self,
        candidate: &CandidateArticle,
        recent: &[RecentPost],
        active: &mut Vec<DynPublisher>,
    ) -> Outcome {
        let parts = &self.parts;
        if parts.history.contains(&candidate.url) {
            return Outcome::Skip(SkipReason::AlreadyPosted);
        }

        let url = if parts.policy.is_redirect(&candidate.url) {
            match parts.fetcher.resolve_redirect(&candidate.url).await {
                Some(resolved) => {
                    debug!(from = %candidate.url, to = %resolved, "redirect resolved");
                    resolved
                }
                None => return Outcome::Skip(SkipReason::RedirectUnresolved),
            }
        } else {
            candidate.url.clone()
        };
        if url != candidate.url {
            if let Some(reason) = self.recheck(&url) {
                return Outcome::Skip(reason);
            }
        }

        let article = match parts.fetcher.fetch_article(&url, candidate.feed_id).await {
            Ok(a) => a,
            Err(e) => {
                debug!(error = %e, "fetch failed");
                return Outcome::Skip(SkipReason::from(&e));
            }
        };
        if article.url != url {
            if let Some(reason) = self.recheck(&article.url) {
                return Outcome::Skip(reason);
            }
        }

        if parts
            .similarity
            .is_similar(&candidate.title, &article.text, recent)
            .await
        {
            return Outcome::Skip(SkipReason::Similar);
        }

        let post = match parts
            .generator
            .generate(&article.text, &candidate.title, &article.url)
            .await
        {
            Ok(p) => p,
            Err(e) => {
                debug!(error = %e, "generation failed");
                return Outcome::Skip(SkipReason::GenerationFailed);
            }
        };

        if self.opts.test_mode {
            info!(
                title = %candidate.title,
                url = %article.url,
                text = %post.text,
                image = article.top_image.as_deref().unwrap_or_default(),
                "test mode, not publishing"
            );
            return Outcome::Success(Posted {
                feed_id: candidate.feed_id,
                url: article.url,
                text: post.text,
                platforms: Vec::new(),
            });
        }

        let request = PostRequest {
            text: &post.text,
            article_url: &article.url,
            article_title: &candidate.title,
            description: &article.summary,
            image_url: article.top_image.as_deref(),
            hashtags: &post.hashtags,
        };

        let mut posted: Vec<Platform> = Vec::new();
        let mut lost: Vec<Platform> = Vec::new();
        for publisher in active.iter() {
            let platform = publisher.platform();
            match publisher.publish(&request).await {
                Ok(post_id) => {
                    info!(platform = %platform, post_id = post_id.as_deref().unwrap_or_default(), "published");
                    posted.push(platform);
                    let record = UsageRecord {
                        feed_id: candidate.feed_id,
                        platform,
                        article_text: &article.text,
                        post_text: &post.text,
                        article_url: &article.url,
                        image_url: article.top_image.as_deref(),
                    };
                    match parts.repository.mark_used(&record).await {
                        Ok(true) => {}
                        Ok(false) => warn!(feed_id = candidate.feed_id, platform = %platform, "no feed row to mark"),
                        Err(e) => error!(feed_id = candidate.feed_id, platform = %platform, error = %e, "mark used failed"),
                    }
                }
                Err(e) => {
                    counter!("pipeline_publish_failures_total", "platform" => platform.as_str())
                        .increment(1);
                    if e.is_fatal_for_platform() {
                        error!(platform = %platform, error = %e, "platform session lost, dropping it");
                        lost.push(platform);
                    } else {
                        warn!(platform = %platform, error = %e, "publish failed");
                    }
                }
            }
        }
        active.retain(|p| !lost.contains(&p.platform()));

        if posted.is_empty() {
            if active.is_empty() {
                return Outcome::Fatal(PipelineError::NoPlatforms);
            }
            return Outcome::Skip(SkipReason::PublishFailed);
        }

        if let Err(e) = parts.history.add(&url) {
            error!(url = %url, error = %e, "could not record url in history");
        }
        Outcome::Success(Posted {
            feed_id: candidate.feed_id,
            url,
            text: post.text,
            platforms: posted,
        })
    }

    /// Domain policy and history for a URL we only learned after resolution.
    fn recheck(&self, url: &str) -> Option<SkipReason> {
        if let Some(reason) = self.parts.policy.check_url(url) {
            return Some(reason);
        }
        self.parts
            .history
            .contains(url)
            .then_some(SkipReason::AlreadyPosted)
    }
}
