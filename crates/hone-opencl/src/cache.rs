//! Persisted work-group tuning results.
//!
//! Search results are keyed by device name + kernel name and stored as
//! JSON, so a process can skip the measurement loop for shapes it has
//! already tuned on this device.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use hone_device::GpuInfo;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dims::NdRange;

/// Environment variable overriding [`TuningCache::default_path`].
pub const CACHE_PATH_ENV: &str = "HONE_TUNING_CACHE";

const DEFAULT_CACHE_FILE: &str = "hone_tuning.json";

/// Errors from cache persistence.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("tuning cache i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("tuning cache is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),
}

/// Best launch shapes per device + kernel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TuningCache {
    entries: HashMap<String, NdRange>,
}

impl TuningCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache key for one kernel on one device.
    pub fn key(gpu_info: &GpuInfo, kernel_name: &str) -> String {
        let device = if gpu_info.device_name.is_empty() {
            "unknown"
        } else {
            gpu_info.device_name.as_str()
        };
        format!("{device}/{kernel_name}")
    }

    pub fn get(&self, key: &str) -> Option<NdRange> {
        self.entries.get(key).copied()
    }

    pub fn insert(&mut self, key: impl Into<String>, range: NdRange) {
        self.entries.insert(key.into(), range);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Where the cache lives unless a caller says otherwise: the
    /// `HONE_TUNING_CACHE` environment variable, or `hone_tuning.json` in
    /// the working directory.
    pub fn default_path() -> PathBuf {
        std::env::var_os(CACHE_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self, CacheError> {
        let text = fs::read_to_string(path)?;
        let cache: Self = serde_json::from_str(&text)?;
        info!(
            "loaded tuning cache from {} ({} entries)",
            path.display(),
            cache.len()
        );
        Ok(cache)
    }

    /// Load the cache, falling back to an empty one when the file is
    /// missing or unreadable.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load_from(path) {
            Ok(cache) => cache,
            Err(CacheError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("no tuning cache at {}", path.display());
                Self::new()
            }
            Err(err) => {
                warn!("ignoring tuning cache at {}: {err}", path.display());
                Self::new()
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), CacheError> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        debug!(
            "saved tuning cache to {} ({} entries)",
            path.display(),
            self.len()
        );
        Ok(())
    }
}
