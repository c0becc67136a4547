use std::sync::Arc;

use tracing::{debug, info, warn};

use super::cache::BundleCache;
use super::transport::BundleTransport;
use crate::core::error::LoaderResult;
use crate::core::manifest::ManifestInfo;

/// Cache-validated bundle downloader.
///
/// With a manifest, a copy cached under the same hash is reused instead of
/// hitting the network; fresh downloads are cached under that hash (after a
/// CRC check when the cache has it enabled).
/// Without one, the bundle is always downloaded and never cached.
#[derive(Clone)]
pub struct BundleDownloader {
    transport: Arc<dyn BundleTransport>,
    cache: BundleCache,
}

impl BundleDownloader {
    pub fn new(transport: Arc<dyn BundleTransport>, cache: BundleCache) -> Self {
        Self { transport, cache }
    }

    pub fn cache(&self) -> &BundleCache {
        &self.cache
    }

    pub async fn fetch_bundle(
        &self,
        bundle_name: &str,
        url: &str,
        manifest: Option<&ManifestInfo>,
    ) -> LoaderResult<Vec<u8>> {
        let Some(manifest) = manifest else {
            debug!("Unconditional download of {} from {}", bundle_name, url);
            return self.transport.fetch_bytes(url).await;
        };

        match self.cache.load(bundle_name, manifest).await {
            Ok(Some(bytes)) => return Ok(bytes),
            Ok(None) => {}
            Err(e) => warn!("Ignoring unreadable cache entry for {}: {}", bundle_name, e),
        }

        let bytes = self.transport.fetch_bytes(url).await?;
        self.cache.check(bundle_name, manifest, &bytes)?;

        if let Err(e) = self.cache.store(bundle_name, manifest, &bytes).await {
            warn!("Could not cache bundle {}: {}", bundle_name, e);
        }

        info!(
            "Downloaded bundle {} ({} bytes, hash {})",
            bundle_name,
            bytes.len(),
            manifest.hash
        );
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::LoaderError;
    use crate::core::test_support::ScriptedTransport;

    const URL: &str = "https://cdn.example.com/scenes/level1";

    #[tokio::test]
    async fn cached_copy_skips_network() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::new());
        transport.serve_bytes(URL, b"payload".to_vec());
        let downloader = BundleDownloader::new(
            transport.clone(),
            BundleCache::new(dir.path().to_path_buf()),
        );
        let manifest = ManifestInfo::describe(b"payload", 1);

        let first = downloader.fetch_bundle("level1", URL, Some(&manifest)).await.unwrap();
        let second = downloader.fetch_bundle("level1", URL, Some(&manifest)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(transport.calls_to(URL), 1);
    }

    #[tokio::test]
    async fn without_manifest_always_downloads() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::new());
        transport.serve_bytes(URL, b"payload".to_vec());
        let downloader = BundleDownloader::new(
            transport.clone(),
            BundleCache::new(dir.path().to_path_buf()),
        );

        downloader.fetch_bundle("level1", URL, None).await.unwrap();
        downloader.fetch_bundle("level1", URL, None).await.unwrap();

        assert_eq!(transport.calls_to(URL), 2);
        assert!(!dir.path().join("level1").exists());
    }

    #[tokio::test]
    async fn crc_mismatch_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::new());
        transport.serve_bytes(URL, b"tampered".to_vec());
        let downloader = BundleDownloader::new(
            transport.clone(),
            BundleCache::new(dir.path().to_path_buf()).with_crc_check(true),
        );
        let manifest = ManifestInfo::describe(b"payload", 1);

        let err = downloader
            .fetch_bundle("level1", URL, Some(&manifest))
            .await
            .unwrap_err();

        assert!(matches!(err, LoaderError::CrcMismatch { .. }));
        assert!(!downloader.cache().bundle_path("level1", &manifest).exists());
    }
}
