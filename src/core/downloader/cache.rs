use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::error::{LoaderError, LoaderResult};
use crate::core::manifest::{ManifestAge, ManifestInfo};
use crate::core::request::{BundleRequest, CacheStrategy};

const BUNDLE_EXTENSION: &str = "bundle";

/// On-disk store of validated bundles keyed by bundle name plus a manifest
/// key: the hash, or `v<version>` under [`CacheStrategy::BuildVersion`].
///
/// Layout under the root:
/// - `<bundle>/<key>.bundle`: payload of the bundle at that key
/// - `<bundle>.manifest`: last manifest fetched for the bundle
/// - `<bundle>age.json`: when that manifest was fetched
#[derive(Debug, Clone)]
pub struct BundleCache {
    root: PathBuf,
    strategy: CacheStrategy,
    verify_crc: bool,
}

impl BundleCache {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            strategy: CacheStrategy::default(),
            verify_crc: false,
        }
    }

    pub fn with_strategy(mut self, strategy: CacheStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Check payloads against the manifest CRC on read and before caching.
    pub fn with_crc_check(mut self, verify_crc: bool) -> Self {
        self.verify_crc = verify_crc;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn verifies_crc(&self) -> bool {
        self.verify_crc
    }

    pub fn strategy(&self) -> CacheStrategy {
        self.strategy
    }

    /// Name a cached copy is stored under for this manifest.
    pub fn cache_key(&self, manifest: &ManifestInfo) -> String {
        match self.strategy {
            CacheStrategy::ManifestHash => manifest.hash.clone(),
            CacheStrategy::BuildVersion => format!("v{}", manifest.version),
        }
    }

    pub fn bundle_path(&self, bundle_name: &str, manifest: &ManifestInfo) -> PathBuf {
        self.root
            .join(bundle_name)
            .join(format!("{}.{}", self.cache_key(manifest), BUNDLE_EXTENSION))
    }

    // ── Bundle payloads ─────────────────────────────────

    /// Return the cached payload for this hash, if present.
    ///
    /// With CRC checking on, a copy that fails the check is deleted and
    /// reported as a miss.
    pub async fn load(
        &self,
        bundle_name: &str,
        manifest: &ManifestInfo,
    ) -> LoaderResult<Option<Vec<u8>>> {
        let path = self.bundle_path(bundle_name, manifest);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(LoaderError::Io { path, source }),
        };

        if let Err(e) = self.check(bundle_name, manifest, &bytes) {
            warn!("Discarding corrupt cached bundle {:?}: {}", path, e);
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!("Cannot remove {:?}: {}", path, e);
            }
            return Ok(None);
        }

        debug!("Cache hit for {} at {}", bundle_name, self.cache_key(manifest));
        Ok(Some(bytes))
    }

    pub fn check(&self, bundle_name: &str, manifest: &ManifestInfo, bytes: &[u8]) -> LoaderResult<()> {
        if self.verify_crc {
            manifest.verify(bundle_name, bytes)?;
        }
        Ok(())
    }

    /// Store `bytes` under this manifest's key and drop copies stored under older keys.
    pub async fn store(
        &self,
        bundle_name: &str,
        manifest: &ManifestInfo,
        bytes: &[u8],
    ) -> LoaderResult<PathBuf> {
        let dest = self.bundle_path(bundle_name, manifest);
        let dir = dest.parent().unwrap_or(&self.root).to_path_buf();
        create_dir(&dir).await?;

        // Write beside the target and rename so readers never see a partial file.
        let staging = dir.join(format!(
            "{}.{}.tmp-{}",
            self.cache_key(manifest),
            BUNDLE_EXTENSION,
            Uuid::new_v4().simple()
        ));
        tokio::fs::write(&staging, bytes)
            .await
            .map_err(|source| LoaderError::Io {
                path: staging.clone(),
                source,
            })?;
        tokio::fs::rename(&staging, &dest)
            .await
            .map_err(|source| LoaderError::Io {
                path: dest.clone(),
                source,
            })?;

        self.evict_stale(&dir, &dest).await;
        debug!("Cached {} ({} bytes) at {:?}", bundle_name, bytes.len(), dest);
        Ok(dest)
    }

    async fn evict_stale(&self, dir: &Path, keep: &Path) {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot scan {:?} for stale bundles: {}", dir, e);
                return;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let is_bundle = path
                .extension()
                .map(|ext| ext == BUNDLE_EXTENSION)
                .unwrap_or(false);
            if is_bundle && path != keep {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => debug!("Evicted stale bundle {:?}", path),
                    Err(e) => warn!("Cannot evict {:?}: {}", path, e),
                }
            }
        }
    }

    // ── Manifest copies ─────────────────────────────────

    /// Keep a copy of the fetched manifest plus its age record.
    pub async fn store_manifest(
        &self,
        request: &BundleRequest,
        manifest: &ManifestInfo,
    ) -> LoaderResult<()> {
        let manifest_path = request.cached_manifest_file(&self.root);
        let age_path = request.manifest_age_file(&self.root);
        if let Some(parent) = manifest_path.parent() {
            create_dir(parent).await?;
        }

        tokio::fs::write(&manifest_path, manifest.to_string())
            .await
            .map_err(|source| LoaderError::Io {
                path: manifest_path,
                source,
            })?;

        let age = ManifestAge::now(request.bundle_name(), manifest);
        let json = serde_json::to_string_pretty(&age)?;
        tokio::fs::write(&age_path, json)
            .await
            .map_err(|source| LoaderError::Io {
                path: age_path,
                source,
            })
    }

    pub async fn cached_manifest(
        &self,
        request: &BundleRequest,
    ) -> LoaderResult<Option<ManifestInfo>> {
        let path = request.cached_manifest_file(&self.root);
        match read_optional(&path).await? {
            Some(raw) => Ok(Some(ManifestInfo::parse(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn manifest_age(&self, request: &BundleRequest) -> LoaderResult<Option<ManifestAge>> {
        let path = request.manifest_age_file(&self.root);
        match read_optional(&path).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}

async fn create_dir(path: &Path) -> LoaderResult<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| LoaderError::Io {
            path: path.to_path_buf(),
            source,
        })
}

async fn read_optional(path: &Path) -> LoaderResult<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => Ok(Some(raw)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(LoaderError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
