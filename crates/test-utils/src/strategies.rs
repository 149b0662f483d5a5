//! Proptest strategies for palimpsest test data.
//!
//! Generators produce raw record histories and configurations; tests turn
//! them into pages and transactions.
//!
//! # Usage
//!
//! ```no_run
//! use palimpsest_test_utils::strategies;
//! use proptest::prelude::*;
//!
//! proptest! {
//!     #[test]
//!     fn my_property(history in strategies::arb_history(6)) {
//!         // replay `history` one revision at a time
//!     }
//! }
//! ```

use palimpsest_types::{BackendKind, RevisioningKind, StorageConfig, TransformKind};
use proptest::prelude::*;

/// Number of record slots in a node page.
pub const SLOTS: usize = 128;

/// Generates a record payload of 0-63 random bytes.
pub fn arb_record_value() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(any::<u8>(), 0..64)
}

/// Generates a slot offset within one node page.
pub fn arb_slot() -> impl Strategy<Value = usize> {
    0..SLOTS
}

/// Generates one slot change: `Some(value)` stores, `None` deletes.
pub fn arb_slot_change() -> impl Strategy<Value = (usize, Option<Vec<u8>>)> {
    (arb_slot(), prop::option::weighted(0.8, arb_record_value()))
}

/// Generates the slot contents of one node page snapshot.
///
/// Every slot is either empty or holds a value; offsets are unique.
pub fn arb_snapshot_slots() -> impl Strategy<Value = Vec<(usize, Vec<u8>)>> {
    proptest::collection::btree_map(arb_slot(), arb_record_value(), 0..24)
        .prop_map(|slots| slots.into_iter().collect())
}

/// Generates up to `max_revisions` revisions of changes to node keys 0-511.
///
/// Each revision is a list of `(node_key, change)` pairs applied in order.
pub fn arb_history(
    max_revisions: usize,
) -> impl Strategy<Value = Vec<Vec<(u64, Option<Vec<u8>>)>>> {
    let change = (0u64..512, prop::option::weighted(0.8, arb_record_value()));
    proptest::collection::vec(proptest::collection::vec(change, 1..8), 1..=max_revisions)
}

/// Generates a dictionary name of 1-16 characters.
pub fn arb_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,15}"
}

/// Generates a valid storage configuration.
pub fn arb_storage_config() -> impl Strategy<Value = StorageConfig> {
    (
        prop::sample::select(vec![BackendKind::File, BackendKind::Kv]),
        prop::sample::select(vec![
            RevisioningKind::FullDump,
            RevisioningKind::Differential,
            RevisioningKind::Incremental,
            RevisioningKind::SlidingSnapshot,
        ]),
        1u32..6,
        prop::sample::select(vec![TransformKind::Identity, TransformKind::Zstd]),
    )
        .prop_map(|(backend, revisioning, revisions_to_restore, transform)| StorageConfig {
            backend,
            revisioning,
            revisions_to_restore,
            transform,
            ..StorageConfig::default()
        })
}
