// ─── Bundle Loader Core ───
// Fetch, cache and register asset bundles, then extract typed resources.
//
// Architecture:
//   core/
//     request     Bundle/asset addressing (remote, local, cache paths)
//     manifest    Manifest wire format + CRC/SHA-1 descriptors
//     config      Loader options, persisted as JSON
//     resolver    Request → remote / local / simulation catalog source
//     downloader/ Transport seam, hash-keyed bundle cache, local opens
//     bundle/     Opened bundles, typed resources, shared registry
//     pipeline    Staged fetch with cancellation

pub mod bundle;
pub mod config;
pub mod downloader;
pub mod error;
pub mod http;
pub mod manifest;
pub mod pipeline;
pub mod request;
pub mod resolver;

#[cfg(test)]
pub(crate) mod test_support;
