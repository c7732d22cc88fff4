// src/config.rs

use anyhow::{anyhow, Context, Result};
use encoding_rs::Encoding;
use serde::Deserialize;
use std::{
    fmt, fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub use crate::process::normalize::CollisionPolicy;

/// Character encoding of the exported reports, selected by the caller.
/// Accepts any WHATWG label (`utf-8`, `latin1`, `iso-8859-1`, `windows-1252`, ...).
#[derive(Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct SourceEncoding(&'static Encoding);

impl SourceEncoding {
    pub fn from_label(label: &str) -> Result<Self> {
        Encoding::for_label(label.trim().as_bytes())
            .map(SourceEncoding)
            .ok_or_else(|| anyhow!("unknown source encoding `{}`", label))
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.0
    }

    pub fn name(&self) -> &'static str {
        self.0.name()
    }
}

impl Default for SourceEncoding {
    fn default() -> Self {
        SourceEncoding(encoding_rs::UTF_8)
    }
}

impl TryFrom<String> for SourceEncoding {
    type Error = anyhow::Error;

    fn try_from(label: String) -> Result<Self> {
        Self::from_label(&label)
    }
}

impl fmt::Debug for SourceEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceEncoding({})", self.name())
    }
}

/// Where and how long to wait for the portal's CSV export to land on disk.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub directory: PathBuf,
    pub extensions: Vec<String>,
    pub poll_interval_ms: u64,
    pub timeout_secs: u64,
}

impl DownloadConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            directory: default_download_dir(),
            extensions: vec!["csv".to_string()],
            poll_interval_ms: 1_000,
            timeout_secs: 30,
        }
    }
}

/// CI runners download into `/tmp`, desktops into `~/Downloads`.
fn default_download_dir() -> PathBuf {
    if std::env::var_os("CI").is_some() {
        return PathBuf::from("/tmp");
    }
    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join("Downloads"))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Run configuration, passed explicitly into every operation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub output_directory: PathBuf,
    pub source_encoding: SourceEncoding,
    pub status_label: Option<String>,
    pub collision_policy: CollisionPolicy,
    /// Normalize each input's headers before merging.
    pub normalize_on_merge: bool,
    pub download: DownloadConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_directory: PathBuf::from("relatorios"),
            source_encoding: SourceEncoding::default(),
            status_label: None,
            collision_policy: CollisionPolicy::default(),
            normalize_on_merge: false,
            download: DownloadConfig::default(),
        }
    }
}

impl Config {
    /// Load a YAML config file. Missing keys fall back to their defaults.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// `Some(path)` loads from disk, `None` yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_yaml_file(p),
            None => Ok(Self::default()),
        }
    }
}
