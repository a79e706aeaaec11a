//! news-poster: one scheduled curation run per invocation.
//!
//! Exit codes: 0 posted, 1 every candidate declined, 2 fatal error, 3 nothing to post.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{error, info, warn};

use news_poster::ai::build_client;
use news_poster::config::settings::parse_platforms;
use news_poster::config::{DomainLists, Settings};
use news_poster::fetcher::{BrowserlessResolver, FetcherConfig, HttpArticleFetcher};
use news_poster::generator::{ContentGenerator, GeneratorConfig};
use news_poster::history::UrlHistory;
use news_poster::logging::{init_tracing, LogFormat};
use news_poster::pipeline::DomainPolicy;
use news_poster::publish::build_publishers;
use news_poster::repository::PgFeedRepository;
use news_poster::selector::{CandidateSelector, SelectorConfig};
use news_poster::similarity::{SimilarityChecker, SimilarityConfig};
use news_poster::{Collaborators, Pipeline, PipelineOptions, RunOutcome};

#[derive(Debug, Parser)]
#[command(name = "news-poster", version, about = "Pick one newsworthy story and post it")]
struct Cli {
    /// Generate the post but do not publish, mark the feed row or write history.
    #[arg(long)]
    test: bool,

    /// Comma separated platforms (bluesky,twitter). Defaults to the config file.
    #[arg(long, value_delimiter = ',')]
    platforms: Vec<String>,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Also append logs to this file.
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,

    /// Settings file (falls back to $NEWS_POSTER_CONFIG, then config/news_poster.toml).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    if let Err(e) = init_tracing(&cli.log_level, cli.log_file.as_deref(), cli.log_format) {
        eprintln!("news-poster: {e:#}");
        return ExitCode::from(2);
    }

    match run(cli).await {
        Ok(outcome) => {
            info!(outcome = outcome.label(), "run finished");
            ExitCode::from(outcome.exit_code() as u8)
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "run failed");
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> Result<RunOutcome> {
    let settings = match &cli.config {
        Some(path) => Settings::load_from_file(path)?,
        None => Settings::load_default()?,
    };
    settings.validate()?;

    let platforms = if cli.platforms.is_empty() {
        settings.platforms()
    } else {
        parse_platforms(&cli.platforms)
    };
    if platforms.is_empty() {
        bail!("no valid platform selected");
    }
    info!(platforms = ?platforms, test_mode = cli.test, "starting run");

    let lists = DomainLists::load_or_default(&settings.domains_file)?;
    let llm = build_client(&settings)?;

    let publishers = build_publishers(&platforms);
    if publishers.is_empty() {
        warn!("no platform has credentials configured");
    }

    let database_url = PgFeedRepository::database_url_from_env()?;
    let repository = PgFeedRepository::connect(&database_url, settings.feed.clone())
        .await
        .context("connecting to the feed database")?;

    let fetcher = HttpArticleFetcher::new(FetcherConfig::from_settings(&settings, &lists))?
        .with_browserless(BrowserlessResolver::from_env());

    let parts = Collaborators {
        repository: Arc::new(repository),
        fetcher: Arc::new(fetcher),
        publishers,
        selector: CandidateSelector::new(llm.clone(), SelectorConfig::from_settings(&settings)),
        similarity: SimilarityChecker::new(llm.clone(), SimilarityConfig::from_settings(&settings)),
        generator: ContentGenerator::new(llm, GeneratorConfig::from_settings(&settings)),
        history: UrlHistory::from_settings(&settings),
        policy: DomainPolicy::new(&lists, &settings.redirect_hosts),
    };
    let pipeline = Pipeline::new(parts, PipelineOptions::from_settings(&settings, cli.test));

    let mut rng = StdRng::from_os_rng();
    Ok(pipeline.run(&mut rng).await?)
}
