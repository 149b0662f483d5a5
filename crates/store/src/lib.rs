//! palimpsest-store: a versioned, node-oriented page store.
//!
//! Every committed revision stays readable forever. New revisions are
//! written copy-on-write next to the old ones and published by atomically
//! replacing a single beacon record.
//!
//! - **Indirection tries**: revisions and node pages are both addressed
//!   through fixed-fanout tries of indirect pages
//! - **Pluggable revisioning**: full dump, differential, incremental or
//!   sliding snapshot, trading read cost against write and space cost
//! - **Bounded write cache**: an LRU of page containers spilling into an
//!   on-disk overflow log
//! - **Two backends**: an append-only flat file with a dual-slot beacon, or
//!   an embedded redb database
//! - **Checksummed frames**: XXH3-128 over every page, optional zstd
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 Storage API                  │
//! │   (create, open, begin_read, begin_write)    │
//! └────────────────┬────────────────────────────┘
//!                  │
//! ┌────────────────▼────────────────────────────┐
//! │             Transaction Layer                │
//! │ (ReadTxn: pinned revision, WriteTxn: COW)   │
//! └───────┬────────────────────────────┬────────┘
//!         │                            │
//! ┌───────▼──────────┐      ┌──────────▼────────┐
//! │   Revisioning    │      │ TransactionLogCache│
//! │ (window, rebuild)│      │  (LRU + overflow)  │
//! └───────┬──────────┘      └──────────┬────────┘
//!         │                            │
//! ┌───────▼────────────────────────────▼────────┐
//! │                 Page Layer                   │
//! │ (uber, revision root, indirect, node, name) │
//! └────────────────┬────────────────────────────┘
//!                  │
//! ┌────────────────▼────────────────────────────┐
//! │              Backend I/O                     │
//! │  (IoFactory: FileBackend / KvBackend)       │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use palimpsest_store::{FactoryRegistry, Storage};
//! use palimpsest_types::{SessionConfig, StorageConfig};
//!
//! let registry = FactoryRegistry::new();
//! let session = SessionConfig::builder().location("data").build()?;
//! let storage = Storage::create(&registry, &StorageConfig::default(), &session)?;
//!
//! // Write transaction
//! let mut txn = storage.begin_write()?;
//! txn.set_record(0, b"x".to_vec())?;
//! let revision = txn.commit()?;
//!
//! // Read transaction
//! let txn = storage.begin_read_at(revision)?;
//! assert_eq!(txn.record(0)?, Some(b"x".to_vec()));
//! # Ok::<(), palimpsest_store::Error>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![cfg_attr(test, allow(clippy::field_reassign_with_default))]

pub mod cache;
pub mod error;
pub mod integrity;
pub mod io;
pub mod page;
pub mod revisioning;
pub mod storage;
pub mod transaction;

pub use cache::{CacheStats, TransactionLogCache};
pub use error::{Error, Result};
pub use integrity::{IntegrityScrubber, ScrubError, ScrubResult};
pub use io::{FactoryRegistry, IoFactory, Reader, Writer};
pub use page::{
    Checksum, Key, NodePage, NodePageContainer, NodeRecord, Page, PageKind, PageReference,
    node_location,
};
pub use revisioning::{Revisioning, strategy_for};
pub use storage::Storage;
pub use transaction::{ReadTransaction, WriteTransaction};

/// Store format version.
pub const VERSION: u16 = io::FORMAT_VERSION;
