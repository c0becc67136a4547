use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::error::{LoaderError, LoaderResult};
use crate::core::request::CacheStrategy;

const APP_DIR_NAME: &str = "bundle-loader";

/// Options recognized by the bundle pipeline.
///
/// Persisted as pretty JSON. Missing keys fall back to [`LoaderConfig::default`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoaderConfig {
    /// Root URL bundles and manifests are published under.
    pub base_url: String,
    /// Skip the network entirely and open bundles from `local_root`.
    pub use_local_source: bool,
    /// Resolve straight from `catalog_root`, bypassing bundles and the registry.
    pub simulate: bool,
    pub local_root: PathBuf,
    pub catalog_root: PathBuf,
    /// Validated bundle copies, cached manifests and manifest age files.
    pub cache_dir: PathBuf,
    pub cache_strategy: CacheStrategy,
    /// Reuse the local manifest copy instead of fetching while it is younger
    /// than this. Only applies to [`CacheStrategy::ManifestHash`].
    pub manifest_max_age_secs: Option<u64>,
    /// Reject payloads whose CRC-32 differs from a non-zero manifest `crc`.
    pub verify_crc: bool,
    pub request_timeout_secs: u64,
    /// Delay between attempts while waiting for a local bundle file to appear.
    pub local_poll_interval_ms: u64,
    /// Give up waiting for a local bundle after this long. `None` waits until cancelled.
    pub local_open_timeout_ms: Option<u64>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            use_local_source: false,
            simulate: false,
            local_root: PathBuf::from("assets").join("bundles"),
            catalog_root: PathBuf::from("assets"),
            cache_dir: default_cache_dir(),
            cache_strategy: CacheStrategy::default(),
            manifest_max_age_secs: None,
            verify_crc: false,
            request_timeout_secs: 30,
            local_poll_interval_ms: 50,
            local_open_timeout_ms: None,
        }
    }
}

impl LoaderConfig {
    pub fn remote(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn manifest_max_age(&self) -> Option<Duration> {
        self.manifest_max_age_secs.map(Duration::from_secs)
    }

    pub fn local_poll_interval(&self) -> Duration {
        Duration::from_millis(self.local_poll_interval_ms.max(1))
    }

    pub fn local_open_timeout(&self) -> Option<Duration> {
        self.local_open_timeout_ms.map(Duration::from_millis)
    }

    pub fn load(path: &Path) -> LoaderResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| LoaderError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Load from `path`, falling back to defaults when the file is missing or corrupt.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Using default loader config, cannot read {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> LoaderResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| LoaderError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| LoaderError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
        .join("bundles")
}
