use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use super::loaded::LoadedBundle;

/// In-process map of opened bundles, keyed by lower-cased bundle name.
///
/// Holds at most one live handle per name. Every mutation is a single
/// insert-or-no-op or a single remove.
#[derive(Default)]
pub struct BundleRegistry {
    bundles: RwLock<HashMap<String, Arc<LoadedBundle>>>,
}

impl BundleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, bundle_name: &str) -> Option<Arc<LoadedBundle>> {
        self.bundles.read().get(&bundle_name.to_lowercase()).cloned()
    }

    pub fn contains(&self, bundle_name: &str) -> bool {
        self.bundles.read().contains_key(&bundle_name.to_lowercase())
    }

    /// Register `bundle` unless its name is already taken, returning the canonical handle.
    ///
    /// A handle that loses to an existing entry is released before returning.
    pub fn put_if_absent(&self, bundle: LoadedBundle) -> Arc<LoadedBundle> {
        self.register(Arc::new(bundle))
    }

    pub(crate) fn register(&self, bundle: Arc<LoadedBundle>) -> Arc<LoadedBundle> {
        let key = bundle.name().to_lowercase();
        let existing = {
            let mut bundles = self.bundles.write();
            match bundles.get(&key) {
                Some(existing) => existing.clone(),
                None => {
                    bundles.insert(key, bundle.clone());
                    info!("Registered bundle {}", bundle.name());
                    return bundle;
                }
            }
        };

        debug!("Bundle {} already registered, releasing duplicate handle", existing.name());
        bundle.unload(true);
        existing
    }

    /// Release and forget `bundle_name`. No-op when it is not registered.
    pub fn unload(&self, bundle_name: &str, unload_dependencies: bool) -> bool {
        let removed = self.bundles.write().remove(&bundle_name.to_lowercase());
        match removed {
            Some(bundle) => {
                bundle.unload(unload_dependencies);
                info!("Unloaded bundle {}", bundle.name());
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.bundles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.read().is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bundles.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }
}
