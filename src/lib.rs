// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod ai;
pub mod config;
pub mod domain_filter;
pub mod error;
pub mod fetcher;
pub mod generator;
pub mod history;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod publish;
pub mod repository;
pub mod selector;
pub mod similarity;
pub mod url_safety;

// ---- Re-exports for stable public API ----
pub use crate::error::PipelineError;
pub use crate::model::{CandidateArticle, Platform, PublishedArticle, RecentPost};
pub use crate::pipeline::{Collaborators, Pipeline, PipelineOptions, RunOutcome, SkipReason};
