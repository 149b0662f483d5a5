//! The storage handle: one versioned page store in one directory.
//!
//! # Example
//!
//! ```no_run
//! use palimpsest_store::{FactoryRegistry, Storage};
//! use palimpsest_types::{SessionConfig, StorageConfig};
//!
//! # fn main() -> palimpsest_store::Result<()> {
//! let registry = FactoryRegistry::new();
//! let session = SessionConfig::builder().location("/tmp/store").build()?;
//! let storage = Storage::create(&registry, &StorageConfig::default(), &session)?;
//!
//! let mut txn = storage.begin_write()?;
//! let node = txn.create_record(b"hello".to_vec())?;
//! let revision = txn.commit()?;
//!
//! let read = storage.begin_read_at(revision)?;
//! assert_eq!(read.record(node)?, Some(b"hello".to_vec()));
//! # Ok(())
//! # }
//! ```

use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use arc_swap::ArcSwap;
use palimpsest_types::{SessionConfig, StorageConfig};
use parking_lot::Mutex;
use snafu::ResultExt;

use crate::{
    cache::TransactionLogCache,
    error::{Error, PropertiesSnafu, Result},
    io::{FactoryRegistry, IoFactory, Writer},
    page::UberPage,
    revisioning::{Revisioning, strategy_for},
    transaction::{PageResolver, ReadTransaction, WriteTransaction, write_bootstrap},
};

/// File holding the storage configuration.
pub const PROPERTIES_FILE: &str = "storage.json";

/// Directory of a write transaction's cache overflow.
pub const TRANSACTION_LOG_DIR: &str = "transaction-log";

/// An open storage.
///
/// Any number of [`ReadTransaction`]s may run alongside at most one
/// [`WriteTransaction`].
pub struct Storage {
    location: PathBuf,
    config: StorageConfig,
    session: SessionConfig,
    factory: Arc<IoFactory>,
    strategy: Arc<dyn Revisioning>,
    latest: ArcSwap<UberPage>,
    write_lock: Mutex<()>,
}

impl Storage {
    /// Creates a storage at the session's location and commits revision 0.
    ///
    /// The properties file is written last and marks the storage as
    /// created. A location missing either the properties file or the beacon
    /// is left over from an interrupted create and is bootstrapped again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageExists`] if the location already holds a
    /// storage, [`Error::Config`] for invalid configuration, or any I/O error.
    pub fn create(
        registry: &FactoryRegistry,
        config: &StorageConfig,
        session: &SessionConfig,
    ) -> Result<Self> {
        config.validate()?;
        session.validate()?;
        let location = session.location.clone();
        if properties_path(&location).exists() {
            // Checked without registering, so the retry below opens with its own codec.
            let has_beacon = match registry.get(&location) {
                Some(factory) => factory.exists()?,
                None => IoFactory::open(&location, &read_properties(&location)?)?.exists()?,
            };
            if has_beacon {
                return Err(Error::StorageExists { location });
            }
            tracing::warn!(
                location = %location.display(),
                "Found properties without beacon, discarding interrupted create"
            );
        }

        let factory = registry.get_or_create(config, session)?;
        if factory.exists()? && !properties_path(&location).exists() {
            tracing::warn!(
                location = %location.display(),
                "Found beacon without properties, discarding interrupted create"
            );
        }
        let uber = write_bootstrap(&factory)?;
        write_properties(&location, config)?;

        tracing::info!(
            location = %location.display(),
            backend = %config.backend,
            revisioning = %config.revisioning,
            revisions_to_restore = config.revisions_to_restore,
            "Created storage"
        );
        Ok(Self::assemble(config.clone(), session.clone(), factory, uber))
    }

    /// Opens the storage at the session's location.
    ///
    /// The storage configuration is read from the location.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] if no storage exists there,
    /// [`Error::Properties`] if its configuration cannot be read, or any
    /// I/O error from loading the beacon.
    pub fn open(registry: &FactoryRegistry, session: &SessionConfig) -> Result<Self> {
        session.validate()?;
        let location = session.location.clone();
        let config = read_properties(&location)?;
        config.validate()?;

        let factory = registry.get_or_create(&config, session)?;
        if !factory.exists()? {
            return Err(Error::NotInitialized { location });
        }
        let uber = factory.reader()?.read_first_reference()?.into_page()?.into_uber()?;

        tracing::info!(
            location = %location.display(),
            latest_revision = uber.latest_revision(),
            "Opened storage"
        );
        Ok(Self::assemble(config, session.clone(), factory, uber))
    }

    fn assemble(
        config: StorageConfig,
        session: SessionConfig,
        factory: Arc<IoFactory>,
        uber: UberPage,
    ) -> Self {
        Self {
            location: session.location.clone(),
            strategy: strategy_for(config.revisioning),
            config,
            session,
            factory,
            latest: ArcSwap::from_pointee(uber),
            write_lock: Mutex::new(()),
        }
    }

    /// Storage directory.
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Configuration fixed at creation.
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Session settings this handle was opened with.
    pub fn session(&self) -> &SessionConfig {
        &self.session
    }

    /// Revisioning strategy chosen when the storage was opened.
    pub fn revisioning(&self) -> &Arc<dyn Revisioning> {
        &self.strategy
    }

    /// I/O factory serving this storage.
    pub fn factory(&self) -> &Arc<IoFactory> {
        &self.factory
    }

    /// Latest committed revision.
    pub fn latest_revision(&self) -> u64 {
        self.latest.load().latest_revision()
    }

    /// Returns true if the backend holds a committed beacon.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub fn exists(&self) -> Result<bool> {
        self.factory.exists()
    }

    /// Begins a read transaction on the latest revision.
    ///
    /// # Errors
    ///
    /// Returns an error if the revision root cannot be loaded.
    pub fn begin_read(&self) -> Result<ReadTransaction> {
        self.begin_read_at(self.latest_revision())
    }

    /// Begins a read transaction pinned to `revision`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RevisionNotFound`] if `revision` is newer than the
    /// latest commit, or an error if its root cannot be loaded.
    pub fn begin_read_at(&self, revision: u64) -> Result<ReadTransaction> {
        let uber = self.latest.load_full();
        let latest = uber.latest_revision();
        if revision > latest {
            return Err(Error::RevisionNotFound { revision, latest });
        }
        let resolver = PageResolver::new(self.factory.reader()?, uber);
        ReadTransaction::new(
            resolver,
            revision,
            Arc::clone(&self.strategy),
            self.config.revisions_to_restore,
        )
    }

    /// Begins the write transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WriteTransactionInProgress`] if one is already open.
    pub fn begin_write(&self) -> Result<WriteTransaction<'_>> {
        let lock = self.write_lock.try_lock().ok_or(Error::WriteTransactionInProgress)?;
        let writer = self.factory.writer()?;
        self.start_write(lock, writer)
    }

    /// Begins the write transaction over a caller-supplied writer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WriteTransactionInProgress`] if one is already open.
    pub fn begin_write_with(&self, writer: Box<dyn Writer>) -> Result<WriteTransaction<'_>> {
        let lock = self.write_lock.try_lock().ok_or(Error::WriteTransactionInProgress)?;
        self.start_write(lock, writer)
    }

    fn start_write<'s>(
        &'s self,
        lock: parking_lot::MutexGuard<'s, ()>,
        writer: Box<dyn Writer>,
    ) -> Result<WriteTransaction<'s>> {
        let resolver = PageResolver::new(self.factory.reader()?, self.latest.load_full());
        let cache = TransactionLogCache::new(
            self.session.cache_capacity,
            self.location.join(TRANSACTION_LOG_DIR),
        );
        WriteTransaction::new(self, lock, resolver, writer, cache)
    }

    pub(crate) fn publish(&self, uber: UberPage) {
        self.latest.store(Arc::new(uber));
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("location", &self.location)
            .field("config", &self.config)
            .field("latest_revision", &self.latest_revision())
            .finish_non_exhaustive()
    }
}

fn properties_path(location: &Path) -> PathBuf {
    location.join(PROPERTIES_FILE)
}

/// Writes the properties file through a temporary file and a rename.
fn write_properties(location: &Path, config: &StorageConfig) -> Result<()> {
    let path = properties_path(location);
    let json = serde_json::to_vec_pretty(config).context(PropertiesSnafu { path: &path })?;
    let staging = path.with_extension("json.tmp");
    let mut file = fs::File::create(&staging)?;
    file.write_all(&json)?;
    file.sync_all()?;
    fs::rename(&staging, &path)?;
    Ok(())
}

fn read_properties(location: &Path) -> Result<StorageConfig> {
    let path = properties_path(location);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(Error::NotInitialized { location: location.to_path_buf() });
        },
        Err(err) => return Err(err.into()),
    };
    serde_json::from_slice(&bytes).context(PropertiesSnafu { path })
}
