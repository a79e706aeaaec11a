// src/history.rs
//! Flat, newline-delimited log of already-published URLs. Capacity-bounded: once it grows
//! past `capacity`, the oldest `cleanup` lines are dropped in one go.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::config::Settings;

#[derive(Debug)]
pub struct UrlHistory {
    path: PathBuf,
    capacity: usize,
    cleanup: usize,
    // guards read -> check -> append -> trim -> persist
    lock: Mutex<()>,
}

impl UrlHistory {
    pub fn new(path: impl Into<PathBuf>, capacity: usize, cleanup: usize) -> Self {
        Self {
            path: path.into(),
            capacity: capacity.max(1),
            cleanup: cleanup.clamp(1, capacity.max(1)),
            lock: Mutex::new(()),
        }
    }

    pub fn from_settings(s: &Settings) -> Self {
        Self::new(s.history_file.clone(), s.history_capacity, s.history_cleanup)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All stored URLs, oldest first. A missing file is an empty history.
    pub fn load(&self) -> io::Result<Vec<String>> {
        read_lines(&self.path)
    }

    /// Membership check. Read errors are logged and reported as "not seen".
    pub fn contains(&self, url: &str) -> bool {
        match self.load() {
            Ok(urls) => urls.iter().any(|u| u == url),
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "cannot read url history");
                false
            }
        }
    }

    /// Append `url` unless already present, trimming the oldest entries when over capacity.
    /// Returns `false` when the URL was already recorded.
    pub fn add(&self, url: &str) -> io::Result<bool> {
        let url = url.trim();
        if url.is_empty() {
            return Ok(false);
        }
        let _guard = self
            .lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut urls = read_lines(&self.path)?;
        if urls.iter().any(|u| u == url) {
            return Ok(false);
        }
        urls.push(url.to_string());
        if urls.len() > self.capacity {
            let drop = self.cleanup.min(urls.len());
            tracing::info!(
                capacity = self.capacity,
                removed = drop,
                "url history over capacity, trimming oldest"
            );
            urls.drain(0..drop);
        }
        write_lines(&self.path, &urls)?;
        tracing::info!(url, "added url to history");
        Ok(true)
    }
}

fn read_lines(path: &Path) -> io::Result<Vec<String>> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(s
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

/// Write to a sibling temp file and rename over the target.
fn write_lines(path: &Path, urls: &[String]) -> io::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let mut body = urls.join("\n");
    body.push('\n');
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, body)?;
    fs::rename(&tmp, path)
}
