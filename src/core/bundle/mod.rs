pub mod loaded;
pub mod registry;
pub mod resource;

pub use loaded::LoadedBundle;
pub use registry::BundleRegistry;
pub use resource::{JsonAsset, RawAsset, Resource, TextAsset};
