pub mod core;

use tracing_subscriber::EnvFilter;

pub use crate::core::bundle::{BundleRegistry, JsonAsset, LoadedBundle, RawAsset, Resource, TextAsset};
pub use crate::core::config::LoaderConfig;
pub use crate::core::downloader::{BundleTransport, HttpTransport};
pub use crate::core::error::{LoaderError, LoaderResult};
pub use crate::core::manifest::{ManifestAge, ManifestInfo};
pub use crate::core::pipeline::{BundleLoader, FetchStage};
pub use crate::core::request::{AssetCacheState, AssetCategory, BundleRequest, CacheStrategy};
pub use tokio_util::sync::CancellationToken;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set. Calling this more than once is harmless.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,bundle_loader=debug")),
        )
        .try_init();
}
