//! Error types for the palimpsest page store.

use std::{io, path::PathBuf};

use palimpsest_types::{CodecError, ConfigError};
use snafu::Snafu;

use crate::page::Key;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during store operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// I/O error from the underlying storage backend.
    #[snafu(display("I/O error: {source}"))]
    Io {
        /// The underlying I/O error.
        source: io::Error,
    },

    /// Serialized page bytes ended early.
    #[snafu(display("Truncated {what}: {source}"))]
    Truncated {
        /// The structure being decoded.
        what: &'static str,
        /// The underlying read error.
        source: io::Error,
    },

    /// Storage content is inconsistent.
    #[snafu(display("Corrupted storage: {reason}"))]
    Corrupted {
        /// Description of what was corrupted.
        reason: String,
    },

    /// A length does not fit the `u32` prefix of the page format.
    #[snafu(display("{what} of {len} bytes exceeds the page format limit"))]
    TooLarge {
        /// The structure being encoded.
        what: &'static str,
        /// The offending length.
        len: usize,
    },

    /// The checksum stored with a page does not match its content.
    #[snafu(display("Checksum mismatch for page at {key}"))]
    ChecksumMismatch {
        /// Backend key of the failing page.
        key: Key,
    },

    /// Decrypting or decompressing a payload produced no bytes.
    #[snafu(display("Byte transform produced empty output"))]
    EmptyTransform,

    /// A serialized page carries a type tag no page kind uses.
    #[snafu(display("Unknown page type tag: {tag}"))]
    UnknownPageTag {
        /// The unrecognized tag.
        tag: i32,
    },

    /// A serialized reference carries a key-kind tag no backend uses.
    #[snafu(display("Unknown key kind tag: {tag}"))]
    UnknownKeyTag {
        /// The unrecognized tag.
        tag: i32,
    },

    /// Invalid magic number in the file header.
    #[snafu(display("Invalid storage file magic number"))]
    InvalidMagic,

    /// Unsupported file format version.
    #[snafu(display("Unsupported format version: {version}"))]
    UnsupportedVersion {
        /// The unsupported version number.
        version: u16,
    },

    /// Opening the key-value database failed.
    #[snafu(display("KV database error: {source}"))]
    KvDatabase {
        /// The underlying redb error.
        source: redb::DatabaseError,
    },

    /// Beginning a key-value transaction failed.
    #[snafu(display("KV transaction error: {source}"))]
    KvTransaction {
        /// The underlying redb error.
        source: redb::TransactionError,
    },

    /// Opening a key-value table failed.
    #[snafu(display("KV table error: {source}"))]
    KvTable {
        /// The underlying redb error.
        source: redb::TableError,
    },

    /// Reading or writing a key-value row failed.
    #[snafu(display("KV storage error: {source}"))]
    KvStorage {
        /// The underlying redb error.
        source: redb::StorageError,
    },

    /// Committing a key-value transaction failed.
    #[snafu(display("KV commit error: {source}"))]
    KvCommit {
        /// The underlying redb error.
        source: redb::CommitError,
    },

    /// Resolving a node page failed.
    #[snafu(display("Failed to resolve node page {page_key} at revision {revision}: {source}"))]
    Resolve {
        /// Page key being resolved.
        page_key: u64,
        /// Revision the lookup was pinned to.
        revision: u64,
        /// What went wrong.
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    /// A page key does not fit in the indirection tree.
    #[snafu(display("Page key {key} exceeds the indirection tree capacity"))]
    PageKeyOutOfRange {
        /// The offending key.
        key: u64,
    },

    /// The requested revision has not been committed.
    #[snafu(display("Revision {revision} not found (latest is {latest})"))]
    RevisionNotFound {
        /// Requested revision.
        revision: u64,
        /// Latest committed revision.
        latest: u64,
    },

    /// The storage location holds no beacon.
    #[snafu(display("No storage initialized at {}", location.display()))]
    NotInitialized {
        /// Storage directory.
        location: PathBuf,
    },

    /// A storage already exists at the location.
    #[snafu(display("Storage already exists at {}", location.display()))]
    StorageExists {
        /// Storage directory.
        location: PathBuf,
    },

    /// Write transaction already in progress.
    #[snafu(display("Write transaction already in progress"))]
    WriteTransactionInProgress,

    /// The write transaction failed earlier and can only be dropped.
    #[snafu(display("Transaction aborted"))]
    TransactionAborted,

    /// The registry holds a factory of a different backend kind for the location.
    #[snafu(display("Backend kind mismatch for {}", location.display()))]
    BackendMismatch {
        /// Storage directory.
        location: PathBuf,
    },

    /// Configuration is invalid.
    #[snafu(display("Configuration error: {source}"))]
    Config {
        /// The underlying validation error.
        source: ConfigError,
    },

    /// The storage properties file could not be read or written.
    #[snafu(display("Storage properties at {}: {source}", path.display()))]
    Properties {
        /// Properties file path.
        path: PathBuf,
        /// The underlying JSON error.
        source: serde_json::Error,
    },

    /// Encoding or decoding a postcard record failed.
    #[snafu(display("Codec error: {source}"))]
    Codec {
        /// The underlying codec error.
        source: CodecError,
    },
}

impl From<io::Error> for Error {
    fn from(source: io::Error) -> Self {
        Error::Io { source }
    }
}

impl From<ConfigError> for Error {
    fn from(source: ConfigError) -> Self {
        Error::Config { source }
    }
}

impl Error {
    /// Returns true for failures that indicate damaged or foreign data
    /// rather than an environmental I/O problem.
    pub fn is_corruption(&self) -> bool {
        match self {
            Error::Truncated { .. }
            | Error::Corrupted { .. }
            | Error::ChecksumMismatch { .. }
            | Error::EmptyTransform
            | Error::UnknownPageTag { .. }
            | Error::UnknownKeyTag { .. }
            | Error::InvalidMagic => true,
            Error::Resolve { source, .. } => source.is_corruption(),
            _ => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_io() {
        let err = Error::from(io::Error::new(io::ErrorKind::NotFound, "gone"));
        let display = format!("{err}");
        assert!(display.starts_with("I/O error:"), "got: {display}");
        assert!(!err.is_corruption());
    }

    #[test]
    fn test_error_display_too_large() {
        let err = Error::TooLarge { what: "node record", len: 5_000_000_000 };
        assert_eq!(
            format!("{err}"),
            "node record of 5000000000 bytes exceeds the page format limit"
        );
        assert!(!err.is_corruption());
    }

    #[test]
    fn test_error_display_checksum_mismatch() {
        let err = Error::ChecksumMismatch { key: Key::File { offset: 128, length: 40 } };
        assert_eq!(format!("{err}"), "Checksum mismatch for page at file@128+40");
        assert!(err.is_corruption());
    }

    #[test]
    fn test_error_display_unknown_tags() {
        assert_eq!(Error::UnknownPageTag { tag: 9 }.to_string(), "Unknown page type tag: 9");
        assert_eq!(Error::UnknownKeyTag { tag: 0 }.to_string(), "Unknown key kind tag: 0");
    }

    #[test]
    fn test_resolve_error_carries_page_key_and_revision() {
        let err = Error::Resolve {
            page_key: 7,
            revision: 3,
            source: Box::new(Error::ChecksumMismatch { key: Key::Kv { id: 12 } }),
        };
        let display = err.to_string();
        assert!(display.contains("node page 7"), "got: {display}");
        assert!(display.contains("revision 3"), "got: {display}");
        assert!(display.contains("kv#12"), "got: {display}");
        assert!(err.is_corruption());
    }

    #[test]
    fn test_revision_not_found_display() {
        let err = Error::RevisionNotFound { revision: 9, latest: 4 };
        assert_eq!(err.to_string(), "Revision 9 not found (latest is 4)");
    }

    #[test]
    fn test_config_error_converts() {
        let err = Error::from(ConfigError::Validation { message: "bad".to_string() });
        assert_eq!(err.to_string(), "Configuration error: invalid config: bad");
    }
}
