pub mod cache;
pub mod client;
pub mod local;
pub mod transport;

pub use cache::BundleCache;
pub use client::BundleDownloader;
pub use local::open_local_bundle;
pub use transport::{BundleTransport, HttpTransport};
