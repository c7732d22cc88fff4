use anyhow::{bail, Context, Result};
use std::{
    collections::HashSet,
    io,
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::{
    fs,
    time::{sleep, Instant},
};
use tracing::{debug, info};

use crate::config::DownloadConfig;

/// Polls a download directory for finished exports.
///
/// A file counts once it has a wanted extension and is non-empty. Files
/// handed out (or present before `ignore_existing`) are never returned again.
#[derive(Debug, Clone)]
pub struct DownloadWatcher {
    dir: PathBuf,
    extensions: Vec<String>,
    interval: Duration,
    timeout: Duration,
    claimed: HashSet<PathBuf>,
}

impl DownloadWatcher {
    pub fn new<S: AsRef<str>>(
        dir: impl Into<PathBuf>,
        extensions: &[S],
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            dir: dir.into(),
            extensions: extensions
                .iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            interval,
            timeout,
            claimed: HashSet::new(),
        }
    }

    pub fn from_config(cfg: &DownloadConfig) -> Self {
        Self::new(
            cfg.directory.clone(),
            cfg.extensions.as_slice(),
            cfg.poll_interval(),
            cfg.timeout(),
        )
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn claim(&mut self, path: impl Into<PathBuf>) {
        self.claimed.insert(path.into());
    }

    /// Claim every matching file already in the directory.
    pub async fn ignore_existing(&mut self) -> Result<usize> {
        let existing = self.candidates().await?;
        let n = existing.len();
        self.claimed.extend(existing);
        debug!(dir = %self.dir.display(), n, "ignoring existing files");
        Ok(n)
    }

    /// Wait until an unclaimed matching file appears, claim it, and return
    /// its path. Fails once `timeout` has elapsed.
    pub async fn next_file(&mut self) -> Result<PathBuf> {
        let start = Instant::now();
        loop {
            if let Some(path) = self.candidates().await?.into_iter().next() {
                info!(path = %path.display(), elapsed = ?start.elapsed(), "download found");
                self.claimed.insert(path.clone());
                return Ok(path);
            }

            let elapsed = start.elapsed();
            if elapsed >= self.timeout {
                bail!(
                    "timed out after {:?} waiting for a .{} file in {}",
                    elapsed,
                    self.extensions.join("/."),
                    self.dir.display()
                );
            }
            sleep(self.interval.min(self.timeout - elapsed)).await;
        }
    }

    /// Unclaimed, non-empty matching files, sorted by path.
    async fn candidates(&self) -> Result<Vec<PathBuf>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(rd) => rd,
            // the browser may not have created it yet
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("listing {}", self.dir.display()))
            }
        };

        let mut found = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .with_context(|| format!("listing {}", self.dir.display()))?
        {
            let path = entry.path();
            if !self.wants(&path) || self.claimed.contains(&path) {
                continue;
            }
            match entry.metadata().await {
                Ok(meta) if meta.is_file() && meta.len() > 0 => found.push(path),
                _ => {}
            }
        }
        found.sort();
        Ok(found)
    }

    fn wants(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                let e = e.to_ascii_lowercase();
                self.extensions.iter().any(|w| *w == e)
            })
            .unwrap_or(false)
    }
}

/// Block (asynchronously) until a non-empty file with one of `extensions`
/// shows up in `dir`, polling every `interval`, for at most `timeout`.
pub async fn wait_for_file<S: AsRef<str>>(
    dir: impl Into<PathBuf>,
    extensions: &[S],
    interval: Duration,
    timeout: Duration,
) -> Result<PathBuf> {
    DownloadWatcher::new(dir, extensions, interval, timeout)
        .next_file()
        .await
}
