//! Crash recovery tests for the commit protocol.
//!
//! A commit persists every page of the new revision and then publishes the
//! beacon. These tests fail the commit at chosen points and verify that the
//! storage, both live and after reopening, still serves the previous
//! revision and accepts new commits.
//!
//! # Crash Points
//!
//! ```text
//! commit():
//!   1. Write node pages                  ← CrashPoint::AfterPageWrites(n)
//!   2. Write indirect pages
//!   3. Write revision root and name page
//!   4. Write UberPage and beacon          ← CrashPoint::BeforeBeacon
//! ```
//!
//! An interrupted `Storage::create` leaves a beacon without a properties
//! file; the location must then accept a second create.
//!
//! The file backend additionally keeps two beacon slots in its header. The
//! header tests tamper with them directly to simulate a crash between the
//! slot write and the god byte flip, and a torn slot write.

// Test code is allowed to use unwrap for simplicity
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]

use std::{path::Path, sync::Arc};

use palimpsest_store::{
    Error, FactoryRegistry, Reader, Result, Storage, Writer,
    io::{FileHeader, HEADER_SIZE, PAGE_FILE},
    storage::PROPERTIES_FILE,
    page::{Page, PageReference},
};
use palimpsest_test_utils::{
    CrashInjector, CrashPoint, TestDir, test_session_config, test_storage_config,
};
use palimpsest_types::{BackendKind, RevisioningKind, StorageConfig, TransformKind};

/// Byte offsets of the two beacon slots in the file header.
const SLOT_OFFSETS: [usize; 2] = [16, 64];

/// A writer that fails the operation at which its injector fires.
struct CrashingWriter {
    inner: Box<dyn Writer>,
    injector: Arc<CrashInjector>,
}

impl CrashingWriter {
    fn boxed(inner: Box<dyn Writer>, injector: &Arc<CrashInjector>) -> Box<dyn Writer> {
        Box::new(Self { inner, injector: Arc::clone(injector) })
    }

    fn crash() -> Error {
        Error::Io { source: std::io::Error::other("injected crash") }
    }
}

impl Reader for CrashingWriter {
    fn read(&self, reference: &PageReference) -> Result<Page> {
        self.inner.read(reference)
    }

    fn read_first_reference(&self) -> Result<PageReference> {
        self.inner.read_first_reference()
    }
}

impl Writer for CrashingWriter {
    fn write(&mut self, reference: &mut PageReference) -> Result<()> {
        if self.injector.on_page_write() {
            return Err(Self::crash());
        }
        self.inner.write(reference)
    }

    fn write_first_reference(&mut self, reference: &mut PageReference) -> Result<()> {
        if self.injector.on_beacon_write() {
            return Err(Self::crash());
        }
        self.inner.write_first_reference(reference)
    }
}

/// Helper: commit one revision setting `node_key` to `value`.
fn commit(storage: &Storage, node_key: u64, value: &str) -> u64 {
    let mut txn = storage.begin_write().unwrap();
    txn.set_record(node_key, value.as_bytes().to_vec()).unwrap();
    txn.commit().unwrap()
}

/// Helper: read one record as a string.
fn read(storage: &Storage, revision: u64, node_key: u64) -> Option<String> {
    let txn = storage.begin_read_at(revision).unwrap();
    txn.record(node_key).unwrap().map(|bytes| String::from_utf8(bytes).unwrap())
}

/// Helper: reopen the storage at `dir` with a fresh registry.
fn reopen(dir: &Path) -> Storage {
    Storage::open(&FactoryRegistry::new(), &test_session_config(dir)).unwrap()
}

/// Helper: create a storage with two committed revisions.
fn setup_two_commits(dir: &TestDir, backend: BackendKind) -> Storage {
    let config = test_storage_config(backend, RevisioningKind::Incremental, 3);
    let storage =
        Storage::create(&FactoryRegistry::new(), &config, &test_session_config(dir.path()))
            .unwrap();
    assert_eq!(commit(&storage, 0, "first"), 1);
    assert_eq!(commit(&storage, 1, "second"), 2);
    storage
}

/// Helper: run a commit through a writer that crashes at `point`.
fn crashing_commit(storage: &Storage, point: CrashPoint) -> Error {
    let injector = CrashInjector::new(point);
    let writer = CrashingWriter::boxed(storage.factory().writer().unwrap(), &injector);
    let mut txn = storage.begin_write_with(writer).unwrap();
    txn.set_record(0, b"lost".to_vec()).unwrap();
    txn.set_record(300, b"lost too".to_vec()).unwrap();
    txn.create_name("lost-name").unwrap();

    injector.arm();
    let err = txn.commit().unwrap_err();
    assert!(injector.has_crashed(), "{point:?} never fired");
    err
}

/// Helper: check the storage still serves exactly revisions 0..=2.
fn assert_previous_state(storage: &Storage) {
    assert_eq!(storage.latest_revision(), 2);
    assert!(storage.exists().unwrap());
    assert_eq!(read(storage, 2, 0).as_deref(), Some("first"));
    assert_eq!(read(storage, 2, 1).as_deref(), Some("second"));
    assert_eq!(read(storage, 2, 300), None);
    assert!(matches!(storage.begin_read_at(3), Err(Error::RevisionNotFound { .. })));
}

#[test]
fn test_crash_points_keep_previous_revision() {
    let points = [
        CrashPoint::AfterPageWrites(0),
        CrashPoint::AfterPageWrites(1),
        CrashPoint::AfterPageWrites(2),
        CrashPoint::BeforeBeacon,
    ];
    for backend in [BackendKind::File, BackendKind::Kv] {
        for point in points {
            let dir = TestDir::new();
            let storage = setup_two_commits(&dir, backend);

            let err = crashing_commit(&storage, point);
            assert!(matches!(err, Error::Io { .. }), "{backend} {point:?}: {err}");
            assert_previous_state(&storage);

            // The live storage accepts the next commit at the same revision.
            assert_eq!(commit(&storage, 2, "after crash"), 3, "{backend} {point:?}");
            drop(storage);

            let storage = reopen(dir.path());
            assert_eq!(storage.latest_revision(), 3, "{backend} {point:?}");
            assert_eq!(read(&storage, 3, 0).as_deref(), Some("first"));
            assert_eq!(read(&storage, 3, 2).as_deref(), Some("after crash"));
            assert_eq!(read(&storage, 3, 300), None);
        }
    }
}

#[test]
fn test_reopen_after_crash_sees_previous_revision() {
    for backend in [BackendKind::File, BackendKind::Kv] {
        let dir = TestDir::new();
        let storage = setup_two_commits(&dir, backend);
        crashing_commit(&storage, CrashPoint::BeforeBeacon);
        drop(storage);

        let storage = reopen(dir.path());
        assert_previous_state(&storage);

        let txn = storage.begin_read().unwrap();
        assert_eq!(txn.name(xxhash_key("lost-name")).unwrap(), None);
        drop(txn);

        assert_eq!(commit(&storage, 5, "recovered"), 3, "{backend}");
        assert_eq!(read(&storage, 3, 5).as_deref(), Some("recovered"));
        assert_eq!(read(&storage, 3, 1).as_deref(), Some("second"));
    }
}

#[test]
fn test_crashed_transaction_releases_write_lock() {
    let dir = TestDir::new();
    let storage = setup_two_commits(&dir, BackendKind::File);
    crashing_commit(&storage, CrashPoint::AfterPageWrites(1));

    let txn = storage.begin_write().unwrap();
    assert_eq!(txn.revision(), 3);
    assert_eq!(txn.base_revision(), 2);
}

#[test]
fn test_interrupted_create_can_be_retried() {
    for backend in [BackendKind::File, BackendKind::Kv] {
        let dir = TestDir::new();
        drop(setup_two_commits(&dir, backend));
        // A create that crashed after its bootstrap never wrote the
        // properties file.
        std::fs::remove_file(dir.join(PROPERTIES_FILE)).unwrap();

        let result = Storage::open(&FactoryRegistry::new(), &dir.session());
        assert!(matches!(result, Err(Error::NotInitialized { .. })), "{backend}: {result:?}");

        let config = StorageConfig {
            transform: TransformKind::Zstd,
            ..test_storage_config(backend, RevisioningKind::Differential, 3)
        };
        let storage = Storage::create(&FactoryRegistry::new(), &config, &dir.session()).unwrap();
        assert_eq!(storage.latest_revision(), 0, "{backend}");
        assert_eq!(read(&storage, 0, 0), None);
        assert_eq!(commit(&storage, 4, "fresh"), 1, "{backend}");
        drop(storage);

        let storage = reopen(dir.path());
        assert_eq!(storage.config(), &config, "{backend}");
        assert_eq!(read(&storage, 1, 4).as_deref(), Some("fresh"));
        assert_eq!(read(&storage, 1, 0), None);
    }
}

/// Key under which a fresh name dictionary stores `name`.
fn xxhash_key(name: &str) -> i32 {
    let mut names = palimpsest_store::page::NamePage::new(0);
    names.create_name(name)
}

// ============================================================================
// File header recovery
// ============================================================================

/// Helper: read the file header of a file-backed storage.
fn read_header(dir: &TestDir) -> FileHeader {
    let bytes = dir.read_at(PAGE_FILE, 0, HEADER_SIZE);
    FileHeader::from_bytes(&bytes.try_into().unwrap()).unwrap()
}

#[test]
fn test_unflipped_god_byte_recovers_previous_revision() {
    let dir = TestDir::new();
    drop(setup_two_commits(&dir, BackendKind::File));

    // Reverting the god byte leaves revision 2 in the secondary slot: the
    // state after its slot write but before the flip.
    let mut header = read_header(&dir);
    header.flip_primary_slot();
    dir.overwrite_at(PAGE_FILE, 0, &header.to_bytes());

    let storage = reopen(dir.path());
    assert_eq!(storage.latest_revision(), 1);
    assert_eq!(read(&storage, 1, 0).as_deref(), Some("first"));
    assert_eq!(read(&storage, 1, 1), None);

    // The next commit overwrites the unpublished slot.
    assert_eq!(commit(&storage, 1, "again"), 2);
    drop(storage);

    let storage = reopen(dir.path());
    assert_eq!(storage.latest_revision(), 2);
    assert_eq!(read(&storage, 2, 0).as_deref(), Some("first"));
    assert_eq!(read(&storage, 2, 1).as_deref(), Some("again"));
}

#[test]
fn test_torn_primary_slot_falls_back_to_secondary() {
    let dir = TestDir::new();
    drop(setup_two_commits(&dir, BackendKind::File));

    let header = read_header(&dir);
    dir.flip_byte(PAGE_FILE, SLOT_OFFSETS[header.primary_slot_index()] as u64 + 2);

    let torn = read_header(&dir);
    assert!(!torn.slot(torn.primary_slot_index()).verify_checksum());
    assert!(torn.current_beacon().unwrap().verify_checksum());

    let storage = reopen(dir.path());
    assert_eq!(storage.latest_revision(), 1);
    assert_eq!(read(&storage, 1, 0).as_deref(), Some("first"));
}

#[test]
fn test_both_slots_torn_is_fatal() {
    let dir = TestDir::new();
    drop(setup_two_commits(&dir, BackendKind::File));

    for offset in SLOT_OFFSETS {
        dir.flip_byte(PAGE_FILE, offset as u64 + 2);
    }

    let result = Storage::open(&FactoryRegistry::new(), &dir.session());
    assert!(matches!(result, Err(Error::Corrupted { .. })), "{result:?}");
}
