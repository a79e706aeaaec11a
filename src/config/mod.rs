// src/config/mod.rs
pub mod domains;
pub mod settings;

pub use domains::DomainLists;
pub use settings::{AiSettings, CategoryShare, FeedSettings, Settings};
