use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Suffix appended to a bundle name to address its manifest.
pub const MANIFEST_SUFFIX: &str = ".manifest";

/// Root folder a bundle is published under. `None` means uncategorized.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AssetCategory {
    None,
    Configuration,
    Services,
    Levels,
    Scenes,
    Screens,
    Audio,
    Prefabs,
}

impl fmt::Display for AssetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetCategory::None => write!(f, "none"),
            AssetCategory::Configuration => write!(f, "configuration"),
            AssetCategory::Services => write!(f, "services"),
            AssetCategory::Levels => write!(f, "levels"),
            AssetCategory::Scenes => write!(f, "scenes"),
            AssetCategory::Screens => write!(f, "screens"),
            AssetCategory::Audio => write!(f, "audio"),
            AssetCategory::Prefabs => write!(f, "prefabs"),
        }
    }
}

/// Whether the manifest is consulted to validate a cached copy before downloading.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssetCacheState {
    #[default]
    Cache,
    NoCache,
}

/// How cached bundle copies are keyed and validated against the manifest.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CacheStrategy {
    /// Key copies by manifest hash and keep a local copy of every fetched manifest.
    #[default]
    ManifestHash,
    /// Key copies by manifest build version; no manifest copy is kept.
    BuildVersion,
}

/// A request for one asset inside one bundle.
///
/// Bundle and asset names are lower-cased on construction; every identity
/// comparison downstream relies on that.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BundleRequest {
    category: AssetCategory,
    bundle_name: String,
    asset_name: String,
    cache_state: AssetCacheState,
}

impl BundleRequest {
    pub fn new(category: AssetCategory, bundle: &str, asset: &str) -> Self {
        Self {
            category,
            bundle_name: bundle.to_lowercase(),
            asset_name: asset.to_lowercase(),
            cache_state: AssetCacheState::default(),
        }
    }

    pub fn with_cache_state(mut self, cache_state: AssetCacheState) -> Self {
        self.cache_state = cache_state;
        self
    }

    pub fn category(&self) -> AssetCategory {
        self.category
    }

    pub fn bundle_name(&self) -> &str {
        &self.bundle_name
    }

    pub fn asset_name(&self) -> &str {
        &self.asset_name
    }

    pub fn cache_state(&self) -> AssetCacheState {
        self.cache_state
    }

    pub fn manifest_name(&self) -> String {
        format!("{}{}", self.bundle_name, MANIFEST_SUFFIX)
    }

    // ── Remote addressing ───────────────────────────────

    /// `{base}/{category}/{bundle}`, or `{base}/{bundle}?r={random}` when uncategorized.
    pub fn remote_bundle_path(&self, base_url: &str) -> String {
        self.remote_path(base_url, &self.bundle_name)
    }

    pub fn remote_manifest_path(&self, base_url: &str) -> String {
        self.remote_path(base_url, &self.manifest_name())
    }

    fn remote_path(&self, base_url: &str, file_name: &str) -> String {
        let base = base_url.trim_end_matches('/');
        match self.category {
            // The random query keeps intermediary HTTP caches from serving a stale copy.
            AssetCategory::None => format!("{}/{}?r={}", base, file_name, cache_buster()),
            category => format!("{}/{}/{}", base, category, file_name),
        }
    }

    // ── Local addressing ────────────────────────────────

    pub fn local_bundle_path(&self, local_root: &Path) -> PathBuf {
        self.local_path(local_root, &self.bundle_name)
    }

    pub fn local_manifest_path(&self, local_root: &Path) -> PathBuf {
        self.local_path(local_root, &self.manifest_name())
    }

    fn local_path(&self, local_root: &Path, file_name: &str) -> PathBuf {
        match self.category {
            AssetCategory::None => local_root.join(file_name),
            category => local_root.join(category.to_string()).join(file_name),
        }
    }

    // ── Cached manifest copy ────────────────────────────

    pub fn cached_manifest_file(&self, cache_dir: &Path) -> PathBuf {
        cache_dir.join(self.manifest_name())
    }

    pub fn manifest_age_file(&self, cache_dir: &Path) -> PathBuf {
        cache_dir.join(format!("{}age.json", self.bundle_name))
    }
}

fn cache_buster() -> u32 {
    (Uuid::new_v4().as_u128() % 10_000_000) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://cdn.example.com/bundles/";

    #[test]
    fn names_are_lowercased() {
        let request = BundleRequest::new(AssetCategory::Scenes, "Level1", "MainCamera");
        assert_eq!(request.bundle_name(), "level1");
        assert_eq!(request.asset_name(), "maincamera");
        assert_eq!(request.manifest_name(), "level1.manifest");
        assert_eq!(request.cache_state(), AssetCacheState::Cache);
    }

    #[test]
    fn categorized_remote_paths() {
        let request = BundleRequest::new(AssetCategory::Scenes, "level1", "level1");
        assert_eq!(
            request.remote_bundle_path(BASE),
            "https://cdn.example.com/bundles/scenes/level1"
        );
        assert_eq!(
            request.remote_manifest_path("https://cdn.example.com/bundles"),
            "https://cdn.example.com/bundles/scenes/level1.manifest"
        );
    }

    #[test]
    fn only_uncategorized_paths_carry_cache_buster() {
        let none = BundleRequest::new(AssetCategory::None, "shared", "atlas");
        let bundle = none.remote_bundle_path(BASE);
        let manifest = none.remote_manifest_path(BASE);
        assert!(bundle.starts_with("https://cdn.example.com/bundles/shared?r="));
        assert!(manifest.starts_with("https://cdn.example.com/bundles/shared.manifest?r="));

        for category in [
            AssetCategory::Configuration,
            AssetCategory::Services,
            AssetCategory::Levels,
            AssetCategory::Scenes,
            AssetCategory::Screens,
            AssetCategory::Audio,
            AssetCategory::Prefabs,
        ] {
            let request = BundleRequest::new(category, "shared", "atlas");
            assert!(!request.remote_bundle_path(BASE).contains("?r="));
            assert!(!request.remote_manifest_path(BASE).contains("?r="));
        }
    }

    #[test]
    fn local_paths() {
        let root = Path::new("/data/bundles");
        let scene = BundleRequest::new(AssetCategory::Audio, "music", "theme");
        assert_eq!(
            scene.local_bundle_path(root),
            PathBuf::from("/data/bundles/audio/music")
        );
        assert_eq!(
            scene.local_manifest_path(root),
            PathBuf::from("/data/bundles/audio/music.manifest")
        );

        let loose = BundleRequest::new(AssetCategory::None, "music", "theme");
        assert_eq!(loose.local_bundle_path(root), PathBuf::from("/data/bundles/music"));
    }

    #[test]
    fn cache_files() {
        let request = BundleRequest::new(AssetCategory::Levels, "forest", "forest");
        let dir = Path::new("/cache");
        assert_eq!(
            request.cached_manifest_file(dir),
            PathBuf::from("/cache/forest.manifest")
        );
        assert_eq!(
            request.manifest_age_file(dir),
            PathBuf::from("/cache/forestage.json")
        );
    }
}
