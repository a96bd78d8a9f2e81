use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::transfer::retry::{DEFAULT_BACKOFF_MS, DEFAULT_MAX_ATTEMPTS};
use crate::transfer::{DEFAULT_BUF_SIZE, DEFAULT_CONCURRENCY, MAX_BUF_SIZE, MAX_WORKERS, calc_buf_size};

pub const CONFIG_VERSION: u32 = 1;

/// Persistent defaults, read from `~/.bulkfetch/config.json`. Every field is
/// optional in the file; command-line flags win over anything set here.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Local directory or `sftp://` URL used when `--store` is absent.
    pub store: Option<String>,
    pub concurrency: usize,
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub buf_size: usize,
    pub version: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: None,
            concurrency: DEFAULT_CONCURRENCY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_ms: DEFAULT_BACKOFF_MS,
            buf_size: DEFAULT_BUF_SIZE,
            version: Some(CONFIG_VERSION),
        }
    }
}

impl Config {
    /// `~/.bulkfetch`, or `None` when the home directory is unknown.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".".to_owned() + env!("CARGO_PKG_NAME")))
    }

    pub fn default_path() -> Option<PathBuf> {
        Self::default_dir().map(|d| d.join("config.json"))
    }

    /// Load from `path`, or from the default location when `path` is `None`.
    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) => p,
                None => {
                    tracing::warn!("[bulkfetch][config] home directory not found, using defaults");
                    return Ok(Self::default());
                }
            },
        };
        if !path.exists() {
            tracing::debug!("[bulkfetch][config] {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::read_from(&path)
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config {}", path.display()))?;
        let cfg: Config = serde_json::from_str(&content)
            .with_context(|| format!("malformed config {}", path.display()))?;
        Ok(cfg.validated())
    }

    /// Clamp values into their usable ranges.
    pub fn validated(mut self) -> Self {
        self.concurrency = self.concurrency.clamp(1, MAX_WORKERS);
        self.max_attempts = self.max_attempts.max(1);
        self.buf_size = calc_buf_size(self.buf_size);
        self
    }
}
