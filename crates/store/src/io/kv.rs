//! Key-value backend: pages stored as rows of an embedded redb database.
//!
//! Pages get ascending non-negative row ids. Negative ids are reserved for
//! storage-level rows:
//!
//! | id | content                                   |
//! |----|-------------------------------------------|
//! | -1 | storage properties (postcard)             |
//! | -2 | highest page id written (big-endian i64)  |
//! | -3 | beacon: serialized first reference        |
//!
//! A writer holds at most one redb write transaction. Publishing the beacon
//! commits it, so pages and beacon become visible together or not at all.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use palimpsest_types::StorageConfig;
use redb::{Database, ReadOnlyTable, ReadableTable, TableDefinition, WriteTransaction};
use snafu::ResultExt;

use super::{Reader, Writer, frame::PageCodec};
use crate::error::{
    CodecSnafu, Error, KvCommitSnafu, KvDatabaseSnafu, KvStorageSnafu, KvTableSnafu,
    KvTransactionSnafu, Result,
};
use crate::page::{Key, Page, PageReference};

/// Name of the database file inside the storage directory.
pub const KV_FILE: &str = "pages.redb";

const PAGES: TableDefinition<i64, &[u8]> = TableDefinition::new("pages");

const PROPERTIES_ID: i64 = -1;
const HIGHEST_ID: i64 = -2;
const BEACON_ID: i64 = -3;

/// Owns the database of one storage.
pub struct KvBackend {
    location: PathBuf,
    db: Arc<Database>,
    codec: PageCodec,
}

impl KvBackend {
    /// Opens or creates the database in `dir`.
    ///
    /// `config` replaces the properties row. A storage is always opened with
    /// the config of its properties file, so the row only changes when a
    /// create is retried over an interrupted one.
    ///
    /// # Errors
    ///
    /// Returns a KV error if the database cannot be opened or initialized.
    pub fn open(dir: &Path, codec: PageCodec, config: &StorageConfig) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let db = Database::create(dir.join(KV_FILE)).context(KvDatabaseSnafu)?;
        let txn = db.begin_write().context(KvTransactionSnafu)?;
        {
            let mut table = txn.open_table(PAGES).context(KvTableSnafu)?;
            let properties = palimpsest_types::encode(config).context(CodecSnafu)?;
            table.insert(PROPERTIES_ID, properties.as_slice()).context(KvStorageSnafu)?;
        }
        txn.commit().context(KvCommitSnafu)?;
        Ok(Self { location: dir.to_path_buf(), db: Arc::new(db), codec })
    }

    /// Returns the properties recorded by the last open.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupted`] if the row is missing.
    pub fn properties(&self) -> Result<StorageConfig> {
        let txn = self.db.begin_read().context(KvTransactionSnafu)?;
        let table = txn.open_table(PAGES).context(KvTableSnafu)?;
        let row = table.get(PROPERTIES_ID).context(KvStorageSnafu)?.ok_or_else(|| {
            Error::Corrupted { reason: "storage properties row is missing".to_string() }
        })?;
        palimpsest_types::decode(row.value()).context(CodecSnafu)
    }

    /// Returns true if a beacon has been committed.
    ///
    /// # Errors
    ///
    /// Returns a KV error if the database cannot be read.
    pub fn exists(&self) -> Result<bool> {
        let txn = self.db.begin_read().context(KvTransactionSnafu)?;
        let table = txn.open_table(PAGES).context(KvTableSnafu)?;
        Ok(table.get(BEACON_ID).context(KvStorageSnafu)?.is_some())
    }

    /// Opens a reader over the latest committed state.
    ///
    /// # Errors
    ///
    /// Returns a KV error if no read transaction can be started.
    pub fn reader(&self) -> Result<KvReader> {
        let txn = self.db.begin_read().context(KvTransactionSnafu)?;
        let table = txn.open_table(PAGES).context(KvTableSnafu)?;
        Ok(KvReader { table, location: self.location.clone(), codec: self.codec.clone() })
    }

    /// Opens a writer. Blocks while another writer holds the database.
    ///
    /// # Errors
    ///
    /// Returns a KV error if no write transaction can be started.
    pub fn writer(&self) -> Result<KvWriter> {
        let txn = self.db.begin_write().context(KvTransactionSnafu)?;
        let next_id = {
            let table = txn.open_table(PAGES).context(KvTableSnafu)?;
            match table.get(HIGHEST_ID).context(KvStorageSnafu)? {
                Some(row) => decode_id(row.value())? + 1,
                None => 0,
            }
        };
        Ok(KvWriter {
            db: Arc::clone(&self.db),
            txn: Some(txn),
            next_id,
            location: self.location.clone(),
            codec: self.codec.clone(),
        })
    }
}

/// Reads pages from one read snapshot of the database.
pub struct KvReader {
    table: ReadOnlyTable<i64, &'static [u8]>,
    location: PathBuf,
    codec: PageCodec,
}

impl Reader for KvReader {
    fn read(&self, reference: &PageReference) -> Result<Page> {
        let (key, id) = kv_key(reference)?;
        let row = self.table.get(id).context(KvStorageSnafu)?.ok_or_else(|| Error::Corrupted {
            reason: format!("no page stored at {key}"),
        })?;
        self.codec.decode(key, reference.checksum(), row.value())
    }

    fn read_first_reference(&self) -> Result<PageReference> {
        let Some(row) = self.table.get(BEACON_ID).context(KvStorageSnafu)? else {
            return Err(Error::NotInitialized { location: self.location.clone() });
        };
        let mut reference = PageReference::from_bytes(row.value())?;
        let page = self.read(&reference)?;
        reference.attach_page(page);
        Ok(reference)
    }
}

/// Writes pages inside a redb write transaction.
///
/// The store transaction is opened on the first write and committed by
/// [`Writer::write_first_reference`]; a later write opens the next one.
pub struct KvWriter {
    db: Arc<Database>,
    txn: Option<WriteTransaction>,
    next_id: i64,
    location: PathBuf,
    codec: PageCodec,
}

impl KvWriter {
    fn txn(&mut self) -> Result<&WriteTransaction> {
        let txn = match self.txn.take() {
            Some(txn) => txn,
            None => self.db.begin_write().context(KvTransactionSnafu)?,
        };
        Ok(self.txn.insert(txn))
    }

    fn insert(&mut self, id: i64, bytes: &[u8]) -> Result<()> {
        let mut table = self.txn()?.open_table(PAGES).context(KvTableSnafu)?;
        table.insert(id, bytes).context(KvStorageSnafu)?;
        Ok(())
    }

    /// Reads a row from the open transaction, or from the committed state
    /// when none is open.
    fn row(&self, id: i64) -> Result<Option<Vec<u8>>> {
        match &self.txn {
            Some(txn) => {
                let table = txn.open_table(PAGES).context(KvTableSnafu)?;
                Ok(table.get(id).context(KvStorageSnafu)?.map(|row| row.value().to_vec()))
            },
            None => {
                let txn = self.db.begin_read().context(KvTransactionSnafu)?;
                let table = txn.open_table(PAGES).context(KvTableSnafu)?;
                Ok(table.get(id).context(KvStorageSnafu)?.map(|row| row.value().to_vec()))
            },
        }
    }
}

impl Reader for KvWriter {
    fn read(&self, reference: &PageReference) -> Result<Page> {
        let (key, id) = kv_key(reference)?;
        let bytes = self.row(id)?.ok_or_else(|| Error::Corrupted {
            reason: format!("no page stored at {key}"),
        })?;
        self.codec.decode(key, reference.checksum(), &bytes)
    }

    fn read_first_reference(&self) -> Result<PageReference> {
        let Some(bytes) = self.row(BEACON_ID)? else {
            return Err(Error::NotInitialized { location: self.location.clone() });
        };
        let mut reference = PageReference::from_bytes(&bytes)?;
        let page = self.read(&reference)?;
        reference.attach_page(page);
        Ok(reference)
    }
}

impl Writer for KvWriter {
    fn write(&mut self, reference: &mut PageReference) -> Result<()> {
        let page = reference.page().ok_or_else(|| Error::Corrupted {
            reason: "cannot write a reference without a page".to_string(),
        })?;
        let framed = self.codec.encode(page)?;
        let id = self.next_id;
        self.insert(id, &framed.bytes)?;
        reference.set_committed(Key::Kv { id }, framed.checksum);
        self.next_id += 1;
        Ok(())
    }

    fn write_first_reference(&mut self, reference: &mut PageReference) -> Result<()> {
        self.write(reference)?;
        self.insert(HIGHEST_ID, &(self.next_id - 1).to_be_bytes())?;
        self.insert(BEACON_ID, &reference.to_bytes()?)?;

        // Committing publishes the revision, so it must be the last step.
        let txn = self.txn.take().ok_or(Error::TransactionAborted)?;
        txn.commit().context(KvCommitSnafu)
    }
}

fn kv_key(reference: &PageReference) -> Result<(Key, i64)> {
    match reference.key() {
        Some(key @ Key::Kv { id }) if id >= 0 => Ok((key, id)),
        Some(key) => Err(Error::Corrupted { reason: format!("{key} is not a page row") }),
        None => Err(Error::Corrupted {
            reason: "cannot read a reference without a key".to_string(),
        }),
    }
}

fn decode_id(bytes: &[u8]) -> Result<i64> {
    let bytes: [u8; 8] = bytes.try_into().map_err(|_| Error::Corrupted {
        reason: format!("highest page id row holds {} bytes", bytes.len()),
    })?;
    Ok(i64::from_be_bytes(bytes))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use palimpsest_test_utils::TestDir;

    use super::*;
    use crate::{
        io::transform::Identity,
        page::{NodePage, NodeRecord, UberPage},
    };

    fn backend(dir: &TestDir) -> KvBackend {
        KvBackend::open(dir.path(), PageCodec::new(Arc::new(Identity)), &StorageConfig::default())
            .unwrap()
    }

    fn node(value: &str) -> Page {
        let mut page = NodePage::new(3, 2);
        page.set_slot(7, Some(NodeRecord::Data(value.as_bytes().to_vec())));
        Page::Node(page)
    }

    #[test]
    fn test_fresh_database_has_no_beacon() {
        let dir = TestDir::new();
        let backend = backend(&dir);
        assert!(!backend.exists().unwrap());
        assert!(matches!(
            backend.reader().unwrap().read_first_reference(),
            Err(Error::NotInitialized { .. })
        ));
        assert_eq!(backend.properties().unwrap(), StorageConfig::default());
    }

    #[test]
    fn test_writer_sees_uncommitted_pages() {
        let dir = TestDir::new();
        let backend = backend(&dir);
        let mut writer = backend.writer().unwrap();
        let mut reference = PageReference::with_page(node("x"));
        writer.write(&mut reference).unwrap();

        assert_eq!(reference.key(), Some(Key::Kv { id: 0 }));
        assert_eq!(writer.read(&reference).unwrap(), node("x"));
    }

    #[test]
    fn test_pages_invisible_until_beacon_commit() {
        let dir = TestDir::new();
        let backend = backend(&dir);
        let mut writer = backend.writer().unwrap();
        let mut page = PageReference::with_page(node("x"));
        writer.write(&mut page).unwrap();
        assert!(backend.reader().unwrap().read(&page).is_err());

        let mut uber = PageReference::with_page(Page::Uber(UberPage::bootstrap()));
        writer.write_first_reference(&mut uber).unwrap();

        let reader = backend.reader().unwrap();
        assert_eq!(reader.read(&page).unwrap(), node("x"));
        assert_eq!(reader.read_first_reference().unwrap().key(), Some(Key::Kv { id: 1 }));
        assert!(backend.exists().unwrap());
    }

    #[test]
    fn test_dropped_writer_discards_pages() {
        let dir = TestDir::new();
        let backend = backend(&dir);
        {
            let mut writer = backend.writer().unwrap();
            let mut page = PageReference::with_page(node("lost"));
            writer.write(&mut page).unwrap();
        }
        assert!(!backend.exists().unwrap());
        let mut writer = backend.writer().unwrap();
        let mut page = PageReference::with_page(node("kept"));
        writer.write(&mut page).unwrap();
        assert_eq!(page.key(), Some(Key::Kv { id: 0 }));
    }

    #[test]
    fn test_ids_continue_across_writers() {
        let dir = TestDir::new();
        let backend = backend(&dir);
        let mut uber = PageReference::with_page(Page::Uber(UberPage::bootstrap()));
        backend.writer().unwrap().write_first_reference(&mut uber).unwrap();

        let mut page = PageReference::with_page(node("next"));
        backend.writer().unwrap().write(&mut page).unwrap();
        assert_eq!(page.key(), Some(Key::Kv { id: 1 }));
    }

    #[test]
    fn test_beacon_commit_leaves_no_open_transaction() {
        let dir = TestDir::new();
        let backend = backend(&dir);
        let mut writer = backend.writer().unwrap();
        let mut page = PageReference::with_page(node("x"));
        writer.write(&mut page).unwrap();
        let mut uber = PageReference::with_page(Page::Uber(UberPage::bootstrap()));
        writer.write_first_reference(&mut uber).unwrap();
        assert!(writer.txn.is_none());

        // The database's write lock is free again.
        drop(backend.writer().unwrap());

        // Reads fall back to the committed state.
        assert_eq!(writer.read(&page).unwrap(), node("x"));
        assert_eq!(writer.read_first_reference().unwrap().key(), Some(Key::Kv { id: 1 }));
    }

    #[test]
    fn test_writer_continues_after_beacon_commit() {
        let dir = TestDir::new();
        let backend = backend(&dir);
        let mut writer = backend.writer().unwrap();
        let mut uber = PageReference::with_page(Page::Uber(UberPage::bootstrap()));
        writer.write_first_reference(&mut uber).unwrap();

        let mut page = PageReference::with_page(node("later"));
        writer.write(&mut page).unwrap();
        assert_eq!(page.key(), Some(Key::Kv { id: 1 }));
        assert_eq!(writer.read(&page).unwrap(), node("later"));

        let mut uber = PageReference::with_page(Page::Uber(UberPage::bootstrap()));
        writer.write_first_reference(&mut uber).unwrap();
        let reader = backend.reader().unwrap();
        assert_eq!(reader.read(&page).unwrap(), node("later"));
        assert_eq!(reader.read_first_reference().unwrap().key(), Some(Key::Kv { id: 2 }));
    }

    #[test]
    fn test_reserved_rows_are_not_pages() {
        let dir = TestDir::new();
        let reference = PageReference::committed(Key::Kv { id: BEACON_ID }, Default::default());
        assert!(matches!(
            backend(&dir).reader().unwrap().read(&reference),
            Err(Error::Corrupted { .. })
        ));
    }

    #[test]
    fn test_open_records_properties() {
        let dir = TestDir::new();
        let zstd = StorageConfig::builder()
            .transform(palimpsest_types::TransformKind::Zstd)
            .build()
            .unwrap();

        let backend = backend(&dir);
        let mut uber = PageReference::with_page(Page::Uber(UberPage::bootstrap()));
        backend.writer().unwrap().write_first_reference(&mut uber).unwrap();
        drop(backend);

        let codec = PageCodec::new(Arc::new(Identity));
        let reopened = KvBackend::open(dir.path(), codec, &zstd).unwrap();
        assert_eq!(reopened.properties().unwrap(), zstd);
        assert!(reopened.exists().unwrap());
    }
}
