use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::core::config::LoaderConfig;
use crate::core::error::{LoaderError, LoaderResult};
use crate::core::request::{AssetCacheState, BundleRequest};

/// Where a request will be served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleSource {
    /// Download over the network. `manifest_url` is set when the cache is validated first.
    Remote {
        bundle_url: String,
        manifest_url: Option<String>,
    },
    /// Open a bundle file under the local root.
    Local(PathBuf),
    /// Loose asset file from the simulation catalog; bypasses bundles and the registry.
    Catalog(PathBuf),
}

/// Turns a request into a concrete source according to the loader config.
#[derive(Clone)]
pub struct SourceResolver {
    config: Arc<LoaderConfig>,
}

impl SourceResolver {
    pub fn new(config: Arc<LoaderConfig>) -> Self {
        Self { config }
    }

    pub async fn resolve(&self, request: &BundleRequest) -> LoaderResult<BundleSource> {
        if !is_plain_file_name(request.bundle_name()) {
            return Err(LoaderError::NotFound(format!(
                "{}/{:?} is not a valid bundle name",
                request.category(),
                request.bundle_name()
            )));
        }

        if self.config.simulate {
            let path = find_in_catalog(&self.config.catalog_root, request.bundle_name())
                .await?
                .ok_or_else(|| {
                    LoaderError::NotFound(format!(
                        "{} in catalog {:?}",
                        request.bundle_name(),
                        self.config.catalog_root
                    ))
                })?;
            return Ok(BundleSource::Catalog(path));
        }

        if self.config.use_local_source {
            return Ok(BundleSource::Local(
                request.local_bundle_path(&self.config.local_root),
            ));
        }

        if self.config.base_url.is_empty() {
            return Err(LoaderError::NotFound(format!(
                "{} (no base URL configured)",
                request.bundle_name()
            )));
        }

        let manifest_url = match request.cache_state() {
            AssetCacheState::Cache => Some(request.remote_manifest_path(&self.config.base_url)),
            AssetCacheState::NoCache => None,
        };
        Ok(BundleSource::Remote {
            bundle_url: request.remote_bundle_path(&self.config.base_url),
            manifest_url,
        })
    }
}

/// Bundle names become single path components under the local root and cache dir.
fn is_plain_file_name(name: &str) -> bool {
    !name.trim().is_empty()
        && name != "."
        && !name.contains(['/', '\\', '\0'])
        && !name.contains("..")
}

/// First file under `root` (sorted path order) whose stem equals `name`, ignoring case.
async fn find_in_catalog(root: &Path, name: &str) -> LoaderResult<Option<PathBuf>> {
    let mut pending = vec![root.to_path_buf()];
    let mut matches = Vec::new();

    while let Some(dir) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(source) => return Err(LoaderError::Io { path: dir, source }),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| LoaderError::Io {
                path: dir.clone(),
                source,
            })?
        {
            let path = entry.path();
            let file_type = entry.file_type().await.map_err(|source| LoaderError::Io {
                path: path.clone(),
                source,
            })?;

            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() && stem_matches(&path, name) {
                matches.push(path);
            }
        }
    }

    matches.sort();
    debug!("Catalog lookup for {}: {} candidate(s)", name, matches.len());
    Ok(matches.into_iter().next())
}

fn stem_matches(path: &Path, name: &str) -> bool {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_lowercase() == name.to_lowercase())
        .unwrap_or(false)
}
