// src/logging.rs
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// `RUST_LOG` wins over `level`. The console layer writes to stderr; `log_file`, when
/// given, gets a second plain-text layer opened in append mode.
pub fn init_tracing(level: &str, log_file: Option<&Path>, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log level {level:?}"))?;

    let json = format == LogFormat::Json;
    let console_json = json.then(|| fmt::layer().json().with_writer(std::io::stderr));
    let console_compact = (!json).then(|| fmt::layer().compact().with_writer(std::io::stderr));

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_json)
        .with(console_compact)
        .with(file_layer)
        .try_init()
        .context("tracing subscriber already installed")?;
    Ok(())
}
