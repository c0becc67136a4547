// ─── Fetch Pipeline ───
// ResolvingSource → FetchingManifest (remote + Cache only) → FetchingBundle
//   → Opened → Extracting → Done, with any stage able to fail.
//
// Concurrent requests for the same bundle are not serialized: each runs its
// own pipeline and the registry's insert-if-absent picks the canonical
// handle. Races can cost a redundant download, never a second entry.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::bundle::{BundleRegistry, LoadedBundle, Resource};
use crate::core::config::LoaderConfig;
use crate::core::downloader::{
    open_local_bundle, BundleCache, BundleDownloader, BundleTransport, HttpTransport,
};
use crate::core::error::{LoaderError, LoaderResult};
use crate::core::http::build_http_client;
use crate::core::manifest::ManifestInfo;
use crate::core::request::{BundleRequest, CacheStrategy};
use crate::core::resolver::{BundleSource, SourceResolver};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStage {
    ResolvingSource,
    FetchingManifest,
    FetchingBundle,
    Opened,
    Extracting,
    Done,
}

impl fmt::Display for FetchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FetchStage::ResolvingSource => "resolving source",
            FetchStage::FetchingManifest => "fetching manifest",
            FetchStage::FetchingBundle => "fetching bundle",
            FetchStage::Opened => "opened",
            FetchStage::Extracting => "extracting",
            FetchStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Caller-facing entry point: fetch a typed resource out of a bundle.
///
/// Cheap to clone; clones share the registry, transport and cache.
#[derive(Clone)]
pub struct BundleLoader {
    config: Arc<LoaderConfig>,
    registry: Arc<BundleRegistry>,
    resolver: SourceResolver,
    transport: Arc<dyn BundleTransport>,
    downloader: BundleDownloader,
}

impl BundleLoader {
    pub fn new(
        config: LoaderConfig,
        registry: Arc<BundleRegistry>,
        transport: Arc<dyn BundleTransport>,
    ) -> Self {
        let config = Arc::new(config);
        let cache = BundleCache::new(config.cache_dir.clone())
            .with_strategy(config.cache_strategy)
            .with_crc_check(config.verify_crc);
        Self {
            resolver: SourceResolver::new(config.clone()),
            downloader: BundleDownloader::new(transport.clone(), cache),
            config,
            registry,
            transport,
        }
    }

    /// Loader backed by a reqwest client built from the config timeout.
    pub fn with_http(config: LoaderConfig, registry: Arc<BundleRegistry>) -> LoaderResult<Self> {
        let client = build_http_client(config.request_timeout())
            .map_err(|e| LoaderError::transport(&config.base_url, e))?;
        Ok(Self::new(
            config,
            registry,
            Arc::new(HttpTransport::new(client)),
        ))
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<BundleRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &BundleCache {
        self.downloader.cache()
    }

    /// Fetch `request.asset_name()` as `T`.
    ///
    /// `Ok(None)` means the bundle opened but holds no such asset.
    pub async fn fetch_resource<T: Resource>(
        &self,
        request: &BundleRequest,
    ) -> LoaderResult<Option<Arc<T>>> {
        self.fetch_resource_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Like [`BundleLoader::fetch_resource`], abandoning the pipeline once `cancel` fires.
    ///
    /// Whatever stage is pending (a transport call, a local-file wait) is
    /// dropped and the caller gets [`LoaderError::Cancelled`].
    pub async fn fetch_resource_with_cancel<T: Resource>(
        &self,
        request: &BundleRequest,
        cancel: &CancellationToken,
    ) -> LoaderResult<Option<Arc<T>>> {
        info!(
            "{:?} | Requesting: {} | {}",
            request.cache_state(),
            request.asset_name(),
            request.bundle_name()
        );

        let mut stage = FetchStage::ResolvingSource;
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(LoaderError::Cancelled(request.bundle_name().to_string())),
            result = self.run::<T>(request, &mut stage) => result,
        };

        match &outcome {
            Ok(_) => debug!("Fetch of {} {}", request.bundle_name(), FetchStage::Done),
            Err(e) if e.is_cancelled() => {
                info!("Fetch of {} cancelled while {}", request.bundle_name(), stage)
            }
            Err(e) => warn!(
                "Fetch of {} failed while {}: {}",
                request.bundle_name(),
                stage,
                e
            ),
        }
        outcome
    }

    /// Release a registered bundle. No-op when it is not registered.
    pub fn unload(&self, bundle_name: &str, unload_dependencies: bool) -> bool {
        self.registry.unload(bundle_name, unload_dependencies)
    }

    async fn run<T: Resource>(
        &self,
        request: &BundleRequest,
        stage: &mut FetchStage,
    ) -> LoaderResult<Option<Arc<T>>> {
        let source = self.resolver.resolve(request).await?;

        if !matches!(source, BundleSource::Catalog(_)) {
            if let Some(bundle) = self.registry.get(request.bundle_name()) {
                debug!("Bundle {} already open", request.bundle_name());
                *stage = FetchStage::Extracting;
                return bundle.load_resource::<T>(request.asset_name()).await;
            }
        }

        let (bytes, manifest) = match source {
            BundleSource::Catalog(path) => {
                *stage = FetchStage::Extracting;
                return load_from_catalog::<T>(&path, request).await.map(Some);
            }
            BundleSource::Remote {
                bundle_url,
                manifest_url,
            } => {
                let manifest = match manifest_url {
                    Some(url) => {
                        *stage = FetchStage::FetchingManifest;
                        Some(self.fetch_manifest(request, &url).await?)
                    }
                    None => None,
                };
                *stage = FetchStage::FetchingBundle;
                let bytes = self
                    .downloader
                    .fetch_bundle(request.bundle_name(), &bundle_url, manifest.as_ref())
                    .await?;
                (bytes, manifest)
            }
            BundleSource::Local(path) => {
                *stage = FetchStage::FetchingBundle;
                let bytes = open_local_bundle(
                    &path,
                    self.config.local_poll_interval(),
                    self.config.local_open_timeout(),
                )
                .await?;
                (bytes, None)
            }
        };

        *stage = FetchStage::Opened;
        let bundle = LoadedBundle::open(request.bundle_name(), bytes, manifest).map_err(|e| {
            debug!("Bundle {} did not open: {}", request.bundle_name(), e);
            LoaderError::Extraction {
                bundle: request.bundle_name().to_string(),
                asset: request.asset_name().to_string(),
            }
        })?;
        let bundle = self.registry.put_if_absent(bundle);

        *stage = FetchStage::Extracting;
        bundle.load_resource::<T>(request.asset_name()).await
    }

    async fn fetch_manifest(
        &self,
        request: &BundleRequest,
        url: &str,
    ) -> LoaderResult<ManifestInfo> {
        let keeps_copy = self.config.cache_strategy == CacheStrategy::ManifestHash;
        if let Some(max_age) = self.config.manifest_max_age().filter(|_| keeps_copy) {
            if let Some(manifest) = self.fresh_manifest_copy(request, max_age).await {
                debug!("Reusing local copy of {}", request.manifest_name());
                return Ok(manifest);
            }
        }

        debug!("Loading manifest {}", request.manifest_name());
        let raw = self.transport.fetch_text(url).await?;
        let manifest = ManifestInfo::parse(&raw)?;
        info!(
            "Acquired manifest | Hash: {} | Version: {} | CRC: {}",
            manifest.hash, manifest.version, manifest.crc
        );

        if keeps_copy {
            if let Err(e) = self.cache().store_manifest(request, &manifest).await {
                warn!("Could not keep a copy of {}: {}", request.manifest_name(), e);
            }
        }
        Ok(manifest)
    }

    /// The local manifest copy, if its age record matches it and is younger than `max_age`.
    async fn fresh_manifest_copy(
        &self,
        request: &BundleRequest,
        max_age: Duration,
    ) -> Option<ManifestInfo> {
        let copy = self.cache().cached_manifest(request).await;
        let age = self.cache().manifest_age(request).await;
        let (manifest, age) = match (copy, age) {
            (Ok(Some(manifest)), Ok(Some(age))) => (manifest, age),
            (Err(e), _) | (_, Err(e)) => {
                warn!("Ignoring local copy of {}: {}", request.manifest_name(), e);
                return None;
            }
            _ => return None,
        };

        let elapsed = (Utc::now() - age.fetched_at).to_std().ok()?;
        (age.hash == manifest.hash && elapsed < max_age).then_some(manifest)
    }
}

async fn load_from_catalog<T: Resource>(path: &Path, request: &BundleRequest) -> LoaderResult<Arc<T>> {
    info!("Simulated | Requesting: {} | {}", request.asset_name(), request.bundle_name());
    let bytes = tokio::fs::read(path).await.map_err(|source| LoaderError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Arc::new(T::decode(request.bundle_name(), bytes)?))
}
