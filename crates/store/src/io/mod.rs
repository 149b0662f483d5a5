//! Backend I/O: readers and writers over a flat file or an embedded KV store.
//!
//! Both backends share the same contract. A page is serialized, checksummed,
//! transformed and persisted under a fresh [`Key`](crate::page::Key); the
//! key and checksum are stored back into the page's reference. The beacon,
//! written by [`Writer::write_first_reference`], is the only mutable record
//! and the single point at which a revision becomes visible.

mod file;
mod frame;
mod header;
mod kv;
mod registry;
mod transform;

use std::path::{Path, PathBuf};

pub use file::{FileBackend, FileReader, FileWriter, PAGE_FILE};
pub use frame::PageCodec;
pub use header::{BeaconSlot, FORMAT_VERSION, FileHeader, HEADER_SIZE, MAGIC};
pub use kv::{KV_FILE, KvBackend, KvReader, KvWriter};
use palimpsest_types::{BackendKind, StorageConfig};
pub use registry::FactoryRegistry;
pub use transform::{ByteTransform, Identity, Zstd, transform_for};

use crate::{
    error::Result,
    page::{Page, PageReference},
};

/// Reads committed pages.
///
/// A reader is not shared across threads; open one per transaction.
pub trait Reader: Send {
    /// Loads the page addressed by `reference`'s key.
    ///
    /// # Errors
    ///
    /// Returns an I/O or KV error if the bytes cannot be read,
    /// [`Error::ChecksumMismatch`](crate::Error::ChecksumMismatch) or
    /// [`Error::EmptyTransform`](crate::Error::EmptyTransform) if they are
    /// damaged, and a tag error if they do not decode to a page.
    fn read(&self, reference: &PageReference) -> Result<Page>;

    /// Loads the beacon and the UberPage it points at.
    ///
    /// The returned reference carries the page.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`](crate::Error::NotInitialized) if no
    /// beacon has been written, or any error [`read`](Self::read) returns.
    fn read_first_reference(&self) -> Result<PageReference>;
}

/// Persists pages. A writer reads its own writes.
pub trait Writer: Reader {
    /// Persists the page held by `reference` and records its key and checksum.
    ///
    /// # Errors
    ///
    /// Returns an I/O or KV error if the page cannot be stored.
    fn write(&mut self, reference: &mut PageReference) -> Result<()>;

    /// Persists the UberPage held by `reference` and publishes it as the beacon.
    ///
    /// # Errors
    ///
    /// Returns an I/O or KV error. On failure the previous beacon stays valid.
    fn write_first_reference(&mut self, reference: &mut PageReference) -> Result<()>;
}

enum Backend {
    File(FileBackend),
    Kv(KvBackend),
}

/// Produces readers and writers for one storage location.
///
/// The backend kind is fixed when the factory is created. Obtain factories
/// through a [`FactoryRegistry`] so that each location has exactly one.
pub struct IoFactory {
    location: PathBuf,
    config: StorageConfig,
    backend: Backend,
}

impl IoFactory {
    /// Opens the backend `config` names in `location`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend files cannot be created or opened.
    pub fn open(location: &Path, config: &StorageConfig) -> Result<Self> {
        let codec = PageCodec::new(transform_for(config));
        let backend = match config.backend {
            BackendKind::File => Backend::File(FileBackend::open(location, codec)?),
            BackendKind::Kv => Backend::Kv(KvBackend::open(location, codec, config)?),
        };
        tracing::debug!(
            location = %location.display(),
            backend = %config.backend,
            "Opened I/O factory"
        );
        Ok(Self { location: location.to_path_buf(), config: config.clone(), backend })
    }

    /// Storage directory served by this factory.
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Backend kind, fixed at creation.
    pub fn kind(&self) -> BackendKind {
        self.config.backend
    }

    /// Storage configuration the factory was created with.
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Returns true if the location holds a committed beacon.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub fn exists(&self) -> Result<bool> {
        match &self.backend {
            Backend::File(file) => file.exists(),
            Backend::Kv(kv) => kv.exists(),
        }
    }

    /// Opens a fresh reader.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be opened for reading.
    pub fn reader(&self) -> Result<Box<dyn Reader>> {
        Ok(match &self.backend {
            Backend::File(file) => Box::new(file.reader()?),
            Backend::Kv(kv) => Box::new(kv.reader()?),
        })
    }

    /// Opens a fresh writer.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be opened for writing.
    pub fn writer(&self) -> Result<Box<dyn Writer>> {
        Ok(match &self.backend {
            Backend::File(file) => Box::new(file.writer()?),
            Backend::Kv(kv) => Box::new(kv.writer()?),
        })
    }
}

impl std::fmt::Debug for IoFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoFactory")
            .field("location", &self.location)
            .field("backend", &self.config.backend)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use palimpsest_test_utils::TestDir;
    use palimpsest_types::TransformKind;

    use super::*;
    use crate::page::{NodePage, NodeRecord, UberPage};

    fn write_and_read(config: &StorageConfig) {
        let dir = TestDir::new();
        let factory = IoFactory::open(dir.path(), config).unwrap();
        assert!(!factory.exists().unwrap());

        let mut node = NodePage::new(9, 1);
        node.set_slot(4, Some(NodeRecord::Data(b"payload".repeat(64))));
        let mut page = PageReference::with_page(Page::Node(node.clone()));
        let mut uber = PageReference::with_page(Page::Uber(UberPage::bootstrap()));

        let mut writer = factory.writer().unwrap();
        writer.write(&mut page).unwrap();
        writer.write_first_reference(&mut uber).unwrap();
        drop(writer);

        assert!(factory.exists().unwrap());
        let reader = factory.reader().unwrap();
        assert_eq!(reader.read(&page).unwrap(), Page::Node(node));
        assert_eq!(reader.read_first_reference().unwrap().key(), uber.key());
    }

    #[test]
    fn test_file_backend_contract() {
        write_and_read(&StorageConfig::default());
    }

    #[test]
    fn test_kv_backend_contract() {
        write_and_read(&StorageConfig { backend: BackendKind::Kv, ..StorageConfig::default() });
    }

    #[test]
    fn test_zstd_transform_on_both_backends() {
        for backend in [BackendKind::File, BackendKind::Kv] {
            write_and_read(&StorageConfig {
                backend,
                transform: TransformKind::Zstd,
                ..StorageConfig::default()
            });
        }
    }

    #[test]
    fn test_factory_reports_kind() {
        let dir = TestDir::new();
        let config = StorageConfig { backend: BackendKind::Kv, ..StorageConfig::default() };
        let factory = IoFactory::open(dir.path(), &config).unwrap();
        assert_eq!(factory.kind(), BackendKind::Kv);
        assert_eq!(factory.location(), dir.path());
        assert!(dir.join(KV_FILE).exists());
    }
}
