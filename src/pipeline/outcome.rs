// src/pipeline/outcome.rs
use std::fmt;

use crate::error::{ArticleError, PipelineError};
use crate::model::Platform;

/// Why a candidate was passed over. `code()` is the stable label used in logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    AlreadyPosted,
    UnparseableUrl,
    RedirectUnresolved,
    BlockedDomain,
    GovernmentDomain,
    PaywallDomain,
    PressRelease,
    UnsafeUrl,
    Paywall,
    FetchFailed,
    InsufficientContent,
    Similar,
    GenerationFailed,
    PublishFailed,
}

impl SkipReason {
    pub fn code(&self) -> &'static str {
        match self {
            SkipReason::AlreadyPosted => "already_posted",
            SkipReason::UnparseableUrl => "unparseable_url",
            SkipReason::RedirectUnresolved => "redirect_unresolved",
            SkipReason::BlockedDomain => "blocked_domain",
            SkipReason::GovernmentDomain => "government_domain",
            SkipReason::PaywallDomain => "paywall_domain",
            SkipReason::PressRelease => "press_release",
            SkipReason::UnsafeUrl => "unsafe_url",
            SkipReason::Paywall => "paywall",
            SkipReason::FetchFailed => "fetch_failed",
            SkipReason::InsufficientContent => "insufficient_content",
            SkipReason::Similar => "similar",
            SkipReason::GenerationFailed => "generation_failed",
            SkipReason::PublishFailed => "publish_failed",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl From<&ArticleError> for SkipReason {
    fn from(e: &ArticleError) -> Self {
        match e {
            ArticleError::Paywall { .. } => SkipReason::Paywall,
            ArticleError::InsufficientContent { .. } => SkipReason::InsufficientContent,
            ArticleError::UnsafeUrl { .. } => SkipReason::UnsafeUrl,
            ArticleError::Fetch { .. } | ArticleError::Parse { .. } => SkipReason::FetchFailed,
        }
    }
}

/// A successful post of one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posted {
    pub feed_id: i64,
    pub url: String,
    pub text: String,
    /// Platforms that accepted the post; empty in dry-run mode.
    pub platforms: Vec<Platform>,
}

/// Result of trying one candidate.
#[derive(Debug)]
pub enum Outcome {
    Success(Posted),
    Skip(SkipReason),
    Fatal(PipelineError),
}

/// Result of one whole run. Fatal errors come back as `Err(PipelineError)` instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Posted {
        feed_id: i64,
        url: String,
        platforms: Vec<Platform>,
    },
    Exhausted {
        attempted: usize,
    },
    NothingToDo,
}

impl RunOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::Posted { .. } => "posted",
            RunOutcome::Exhausted { .. } => "exhausted",
            RunOutcome::NothingToDo => "nothing_to_do",
        }
    }

    /// Process exit code: 0 posted, 1 exhausted, 3 nothing to do (2 is reserved for fatal).
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Posted { .. } => 0,
            RunOutcome::Exhausted { .. } => 1,
            RunOutcome::NothingToDo => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_errors_map_to_distinct_reasons() {
        let paywall = ArticleError::Paywall { url: "u".into() };
        let short = ArticleError::InsufficientContent {
            url: "u".into(),
            words: 3,
            min: 50,
        };
        let parse = ArticleError::Parse {
            url: "u".into(),
            message: "m".into(),
        };
        assert_eq!(SkipReason::from(&paywall), SkipReason::Paywall);
        assert_eq!(SkipReason::from(&short), SkipReason::InsufficientContent);
        assert_eq!(SkipReason::from(&parse).code(), "fetch_failed");
    }

    #[test]
    fn exit_codes_distinguish_outcomes() {
        let posted = RunOutcome::Posted {
            feed_id: 1,
            url: "u".into(),
            platforms: vec![],
        };
        assert_eq!(posted.exit_code(), 0);
        assert_eq!(RunOutcome::Exhausted { attempted: 3 }.exit_code(), 1);
        assert_eq!(RunOutcome::NothingToDo.exit_code(), 3);
    }
}
