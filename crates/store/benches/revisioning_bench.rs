//! Revisioning benchmarks.
//!
//! Measures node page reconstruction per strategy, both in isolation over
//! synthetic snapshot windows and end to end through read transactions on a
//! file-backed storage.

#![allow(clippy::expect_used, missing_docs)]

use std::{hint::black_box, time::Duration};

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use palimpsest_store::{
    FactoryRegistry, Storage,
    page::{NODE_PAGE_SLOTS, NodePage, NodeRecord},
    strategy_for,
};
use palimpsest_types::{BackendKind, RevisioningKind, SessionConfig, StorageConfig};
use tempfile::TempDir;

const STRATEGIES: [RevisioningKind; 4] = [
    RevisioningKind::FullDump,
    RevisioningKind::Differential,
    RevisioningKind::Incremental,
    RevisioningKind::SlidingSnapshot,
];

// =============================================================================
// Helpers
// =============================================================================

/// Builds a newest-first window of `len` snapshots ending at a full dump.
///
/// The oldest snapshot fills every slot; each newer one rewrites a stripe of
/// `NODE_PAGE_SLOTS / len` slots.
fn synthetic_window(len: usize) -> Vec<NodePage> {
    let stripe = (NODE_PAGE_SLOTS / len).max(1);
    let base = len as u64 * 10;
    (0..len)
        .map(|age| {
            let revision = base - age as u64;
            let mut page = NodePage::new(0, revision);
            let slots =
                if age == len - 1 { 0..NODE_PAGE_SLOTS } else { age * stripe..(age + 1) * stripe };
            for offset in slots {
                page.set_slot(offset, Some(NodeRecord::Data(vec![revision as u8; 64])));
            }
            page
        })
        .collect()
}

/// Creates a file-backed storage with `revisions` commits rewriting one page.
fn populated_storage(revisioning: RevisioningKind, revisions: u64) -> (TempDir, Storage) {
    let temp_dir = TempDir::new().expect("create temp dir");
    let config = StorageConfig::builder()
        .backend(BackendKind::File)
        .revisioning(revisioning)
        .revisions_to_restore(8)
        .build()
        .expect("valid config");
    let session = SessionConfig::builder()
        .location(temp_dir.path())
        .build()
        .expect("valid session");
    let storage =
        Storage::create(&FactoryRegistry::new(), &config, &session).expect("create storage");

    for revision in 1..=revisions {
        let mut txn = storage.begin_write().expect("write txn");
        for i in 0..8 {
            let node_key = (revision * 8 + i) % NODE_PAGE_SLOTS as u64;
            txn.set_record(node_key, vec![revision as u8; 64]).expect("set record");
        }
        txn.commit().expect("commit");
    }
    (temp_dir, storage)
}

// =============================================================================
// Reconstruction
// =============================================================================

/// Benchmark read reconstruction over windows of growing length.
fn bench_reconstruct_for_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("revisioning/reconstruct_for_read");
    group.throughput(Throughput::Elements(NODE_PAGE_SLOTS as u64));

    for kind in STRATEGIES {
        let strategy = strategy_for(kind);
        for len in [1, 4, 16] {
            let window = synthetic_window(len);
            group.bench_with_input(BenchmarkId::new(kind.to_string(), len), &window, |b, window| {
                b.iter(|| black_box(strategy.reconstruct_for_read(window)));
            });
        }
    }

    group.finish();
}

/// Benchmark write reconstruction with and without a required full dump.
fn bench_reconstruct_for_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("revisioning/reconstruct_for_write");

    for kind in STRATEGIES {
        let strategy = strategy_for(kind);
        let window = synthetic_window(8);
        let next = window[0].revision() + 1;
        for full_dump in [false, true] {
            let id = if full_dump { "full_dump" } else { "partial" };
            group.bench_with_input(BenchmarkId::new(kind.to_string(), id), &window, |b, window| {
                b.iter(|| black_box(strategy.reconstruct_for_write(window, 8, next, full_dump)));
            });
        }
    }

    group.finish();
}

// =============================================================================
// Read transactions
// =============================================================================

/// Benchmark a cold record read, including window loading from disk.
fn bench_record_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("revisioning/record_read");
    group.throughput(Throughput::Elements(1));

    for kind in STRATEGIES {
        let (_temp_dir, storage) = populated_storage(kind, 32);
        let latest = storage.latest_revision();
        group.bench_function(BenchmarkId::new(kind.to_string(), latest), |b| {
            let mut node_key = 0u64;
            b.iter(|| {
                node_key = (node_key + 1) % NODE_PAGE_SLOTS as u64;
                let txn = storage.begin_read().expect("read txn");
                black_box(txn.record(node_key).expect("record"))
            });
        });
    }

    group.finish();
}

// =============================================================================
// Benchmark Groups
// =============================================================================

criterion_group! {
    name = reconstruct_benches;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(5))
        .sample_size(50);
    targets = bench_reconstruct_for_read, bench_reconstruct_for_write
}

criterion_group! {
    name = read_benches;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(10))
        .sample_size(20);
    targets = bench_record_read
}

criterion_main!(reconstruct_benches, read_benches);
