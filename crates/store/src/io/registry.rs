//! Per-location factory registry.

use std::{
    collections::{HashMap, hash_map::Entry},
    path::{Path, PathBuf},
    sync::Arc,
};

use palimpsest_types::{SessionConfig, StorageConfig};
use parking_lot::Mutex;

use super::IoFactory;
use crate::error::{Error, Result};

/// Maps storage locations to their single [`IoFactory`].
///
/// Owned by the application root and passed to whatever opens storages.
/// Concurrent callers asking for the same location all receive the factory
/// the first of them created.
#[derive(Debug, Default)]
pub struct FactoryRegistry {
    factories: Mutex<HashMap<PathBuf, Arc<IoFactory>>>,
}

impl FactoryRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the factory for the session's location, creating it if absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendMismatch`] if the location is registered with
    /// another backend kind, or any error opening the backend.
    pub fn get_or_create(
        &self,
        storage: &StorageConfig,
        session: &SessionConfig,
    ) -> Result<Arc<IoFactory>> {
        let mut factories = self.factories.lock();
        match factories.entry(session.location.clone()) {
            Entry::Occupied(entry) => {
                let factory = entry.get();
                if factory.kind() != storage.backend {
                    return Err(Error::BackendMismatch { location: session.location.clone() });
                }
                Ok(Arc::clone(factory))
            },
            Entry::Vacant(entry) => {
                let factory = Arc::new(IoFactory::open(&session.location, storage)?);
                Ok(Arc::clone(entry.insert(factory)))
            },
        }
    }

    /// Returns the factory registered for `location`, if any.
    pub fn get(&self, location: &Path) -> Option<Arc<IoFactory>> {
        self.factories.lock().get(location).cloned()
    }

    /// Drops the registry's handle on `location`'s factory.
    ///
    /// The backend closes once every storage using it is dropped.
    pub fn remove(&self, location: &Path) -> Option<Arc<IoFactory>> {
        self.factories.lock().remove(location)
    }

    /// Number of registered locations.
    pub fn len(&self) -> usize {
        self.factories.lock().len()
    }

    /// Returns true if no location is registered.
    pub fn is_empty(&self) -> bool {
        self.factories.lock().is_empty()
    }
}
