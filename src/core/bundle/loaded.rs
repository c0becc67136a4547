use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;
use zip::ZipArchive;

use super::resource::Resource;
use crate::core::error::{LoaderError, LoaderResult};
use crate::core::manifest::ManifestInfo;

type Archive = ZipArchive<Cursor<Arc<[u8]>>>;

/// Upper bound on the buffer reserved up front from an entry's declared size.
const MAX_ENTRY_PREALLOC: u64 = 8 * 1024 * 1024;
type ResourceMemo = HashMap<(String, TypeId), Arc<dyn Any + Send + Sync>>;

/// An opened bundle: the archive handle plus the manifest it was validated against.
///
/// The handle stays usable until [`LoadedBundle::unload`] releases it.
pub struct LoadedBundle {
    name: String,
    manifest: Option<ManifestInfo>,
    archive: RwLock<Option<Archive>>,
    resources: Mutex<ResourceMemo>,
}

impl LoadedBundle {
    /// Open `bytes` as a bundle archive.
    pub fn open(name: &str, bytes: Vec<u8>, manifest: Option<ManifestInfo>) -> LoaderResult<Self> {
        let data: Arc<[u8]> = bytes.into();
        let archive = ZipArchive::new(Cursor::new(data))?;
        debug!("Opened bundle {} with {} entries", name, archive.len());

        Ok(Self {
            name: name.to_lowercase(),
            manifest,
            archive: RwLock::new(Some(archive)),
            resources: Mutex::new(HashMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn manifest(&self) -> Option<&ManifestInfo> {
        self.manifest.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.archive.read().is_some()
    }

    /// Entry paths inside the bundle, sorted. Empty once unloaded.
    pub fn asset_names(&self) -> Vec<String> {
        let guard = self.archive.read();
        let mut names: Vec<String> = guard
            .iter()
            .flat_map(|archive| archive.file_names())
            .filter(|name| !name.ends_with('/'))
            .map(str::to_string)
            .collect();
        names.sort_unstable();
        names
    }

    /// Load the asset named `asset_name` as `T`.
    ///
    /// Matches the full entry path or its file stem, ignoring case.
    /// Returns `Ok(None)` when no entry matches. Decoded values are shared
    /// between callers asking for the same name and type.
    pub async fn load_resource<T: Resource>(&self, asset_name: &str) -> LoaderResult<Option<Arc<T>>> {
        let asset_name = asset_name.to_lowercase();
        let key = (asset_name.clone(), TypeId::of::<T>());

        let memoized = self.resources.lock().get(&key).cloned();
        if let Some(resource) = memoized.and_then(|r| r.downcast::<T>().ok()) {
            return Ok(Some(resource));
        }

        let archive = self
            .archive
            .read()
            .clone()
            .ok_or_else(|| LoaderError::Extraction {
                bundle: self.name.clone(),
                asset: asset_name.clone(),
            })?;

        let lookup = asset_name.clone();
        let decoded = tokio::task::spawn_blocking(move || -> LoaderResult<Option<T>> {
            match read_entry(archive, &lookup)? {
                Some(bytes) => Ok(Some(T::decode(&lookup, bytes)?)),
                None => Ok(None),
            }
        })
        .await??;

        let Some(resource) = decoded.map(Arc::new) else {
            debug!("Asset {} not present in bundle {}", asset_name, self.name);
            return Ok(None);
        };

        if !self.is_loaded() {
            return Ok(Some(resource));
        }
        let shared = self
            .resources
            .lock()
            .entry(key)
            .or_insert_with(|| resource.clone() as Arc<dyn Any + Send + Sync>)
            .clone();
        Ok(Some(shared.downcast::<T>().unwrap_or(resource)))
    }

    /// Release the archive. With `unload_dependencies`, also drop every
    /// resource already extracted from it. Returns false if already unloaded.
    pub fn unload(&self, unload_dependencies: bool) -> bool {
        let released = self.archive.write().take().is_some();
        if unload_dependencies {
            self.resources.lock().clear();
        }
        if released {
            debug!(
                "Unloaded bundle {} (dependencies: {})",
                self.name, unload_dependencies
            );
        }
        released
    }
}

impl std::fmt::Debug for LoadedBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedBundle")
            .field("name", &self.name)
            .field("manifest", &self.manifest)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

fn read_entry(mut archive: Archive, asset_name: &str) -> LoaderResult<Option<Vec<u8>>> {
    let Some(entry_name) = match_entry(&archive, asset_name) else {
        return Ok(None);
    };

    let mut file = archive.by_name(&entry_name)?;
    let mut bytes = Vec::with_capacity(entry_capacity(file.size()));
    file.read_to_end(&mut bytes)
        .map_err(|source| LoaderError::Io {
            path: PathBuf::from(&entry_name),
            source,
        })?;
    Ok(Some(bytes))
}

/// The declared size comes from the archive and is not trusted past the cap.
fn entry_capacity(declared_size: u64) -> usize {
    declared_size.min(MAX_ENTRY_PREALLOC) as usize
}

/// Exact path match wins over a file-stem match; ties go to the first path in sort order.
fn match_entry(archive: &Archive, asset_name: &str) -> Option<String> {
    let mut candidates: Vec<&str> = archive
        .file_names()
        .filter(|name| !name.ends_with('/'))
        .collect();
    candidates.sort_unstable();

    candidates
        .iter()
        .find(|name| name.to_lowercase() == asset_name)
        .or_else(|| {
            candidates.iter().find(|name| {
                Path::new(name)
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().to_lowercase() == asset_name)
                    .unwrap_or(false)
            })
        })
        .map(|name| name.to_string())
}
