//! Test configuration helpers.
//!
//! Provides ready-made configurations for tests, centralizing values that
//! would otherwise be scattered across test modules.

// Test configurations are valid by construction
#![allow(clippy::expect_used)]

use std::path::Path;

use palimpsest_types::{BackendKind, RevisioningKind, SessionConfig, StorageConfig};

/// Cache capacity used by [`test_session_config`].
///
/// Small enough that multi-page transactions spill to the overflow log.
pub const TEST_CACHE_CAPACITY: usize = 4;

/// Returns a storage configuration with the given backend, strategy and
/// full-dump cadence, and default transform settings.
///
/// # Panics
///
/// Panics if `revisions_to_restore` is 0.
#[must_use]
pub fn test_storage_config(
    backend: BackendKind,
    revisioning: RevisioningKind,
    revisions_to_restore: u32,
) -> StorageConfig {
    StorageConfig::builder()
        .backend(backend)
        .revisioning(revisioning)
        .revisions_to_restore(revisions_to_restore)
        .build()
        .expect("valid test storage config")
}

/// Returns a session for `location` with a [`TEST_CACHE_CAPACITY`] cache.
///
/// # Panics
///
/// Panics if `location` is empty.
#[must_use]
pub fn test_session_config(location: &Path) -> SessionConfig {
    SessionConfig::builder()
        .location(location)
        .cache_capacity(TEST_CACHE_CAPACITY)
        .build()
        .expect("valid test session config")
}

/// Returns every backend and strategy combination with the given cadence.
#[must_use]
pub fn all_storage_configs(revisions_to_restore: u32) -> Vec<StorageConfig> {
    let strategies = [
        RevisioningKind::FullDump,
        RevisioningKind::Differential,
        RevisioningKind::Incremental,
        RevisioningKind::SlidingSnapshot,
    ];
    [BackendKind::File, BackendKind::Kv]
        .into_iter()
        .flat_map(|backend| {
            strategies.into_iter().map(move |revisioning| {
                test_storage_config(backend, revisioning, revisions_to_restore)
            })
        })
        .collect()
}
