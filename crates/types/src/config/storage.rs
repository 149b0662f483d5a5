//! Storage-wide configuration fixed at creation time.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Minimum number of revisions between full dumps (and minimum window length).
const MIN_REVISIONS_TO_RESTORE: u32 = 1;

/// Maximum zstd compression level.
const MAX_COMPRESSION_LEVEL: i32 = 22;

/// Minimum zstd compression level.
const MIN_COMPRESSION_LEVEL: i32 = 1;

/// Backend that persists framed pages.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Append-only flat file with a fixed beacon header.
    #[default]
    File,
    /// Embedded transactional key-value store.
    Kv,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => f.write_str("file"),
            Self::Kv => f.write_str("kv"),
        }
    }
}

/// Algorithm used to reconstruct node pages from historical snapshots.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum RevisioningKind {
    /// Every revision stores a complete copy of each touched page.
    FullDump,
    /// Every revision stores all changes since the last full dump.
    Differential,
    /// Every revision stores only its own changes; full dumps bound the chain.
    #[default]
    Incremental,
    /// A fixed-length window of snapshots, rematerializing expiring slots.
    SlidingSnapshot,
}

impl fmt::Display for RevisioningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FullDump => "full-dump",
            Self::Differential => "differential",
            Self::Incremental => "incremental",
            Self::SlidingSnapshot => "sliding-snapshot",
        };
        f.write_str(name)
    }
}

/// Byte transform applied to page payloads before they reach the backend.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    /// Bytes are stored as serialized.
    #[default]
    Identity,
    /// Bytes are zstd-compressed.
    Zstd,
}

/// Storage configuration.
///
/// Chosen once when a storage is created and persisted with it; every later
/// open reads it back instead of taking it from the caller.
///
/// # Validation Rules
///
/// - `revisions_to_restore` must be >= 1
/// - `compression_level` must be 1-22 (zstd valid range)
///
/// # Example
///
/// ```no_run
/// # use palimpsest_types::config::{BackendKind, RevisioningKind, StorageConfig};
/// let config = StorageConfig::builder()
///     .backend(BackendKind::Kv)
///     .revisioning(RevisioningKind::SlidingSnapshot)
///     .revisions_to_restore(3)
///     .build()
///     .expect("valid storage config");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StorageConfig {
    /// Backend that persists pages.
    #[serde(default)]
    pub backend: BackendKind,
    /// Revisioning strategy.
    #[serde(default)]
    pub revisioning: RevisioningKind,
    /// Full-dump cadence, and window length for the sliding snapshot.
    #[serde(default = "default_revisions_to_restore")]
    pub revisions_to_restore: u32,
    /// Transform applied to page payloads.
    #[serde(default)]
    pub transform: TransformKind,
    /// Zstd level, used when `transform` is [`TransformKind::Zstd`].
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,
}

#[bon::bon]
impl StorageConfig {
    /// Creates a new storage configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if:
    /// - `revisions_to_restore` is 0
    /// - `compression_level` outside 1-22
    #[builder]
    pub fn new(
        #[builder(default)] backend: BackendKind,
        #[builder(default)] revisioning: RevisioningKind,
        #[builder(default = default_revisions_to_restore())] revisions_to_restore: u32,
        #[builder(default)] transform: TransformKind,
        #[builder(default = default_compression_level())] compression_level: i32,
    ) -> Result<Self, ConfigError> {
        let config =
            Self { backend, revisioning, revisions_to_restore, transform, compression_level };
        config.validate()?;
        Ok(config)
    }
}

impl StorageConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.revisions_to_restore < MIN_REVISIONS_TO_RESTORE {
            return Err(ConfigError::Validation {
                message: format!(
                    "revisions_to_restore must be >= {}, got {}",
                    MIN_REVISIONS_TO_RESTORE, self.revisions_to_restore
                ),
            });
        }
        if self.compression_level < MIN_COMPRESSION_LEVEL
            || self.compression_level > MAX_COMPRESSION_LEVEL
        {
            return Err(ConfigError::Validation {
                message: format!(
                    "compression_level must be {}-{}, got {}",
                    MIN_COMPRESSION_LEVEL, MAX_COMPRESSION_LEVEL, self.compression_level
                ),
            });
        }
        Ok(())
    }

    /// Returns true if pages written in `revision` are full dumps.
    pub fn is_full_dump_revision(&self, revision: u64) -> bool {
        revision % u64::from(self.revisions_to_restore.max(MIN_REVISIONS_TO_RESTORE)) == 0
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            revisioning: RevisioningKind::default(),
            revisions_to_restore: default_revisions_to_restore(),
            transform: TransformKind::default(),
            compression_level: default_compression_level(),
        }
    }
}

fn default_revisions_to_restore() -> u32 {
    4
}

fn default_compression_level() -> i32 {
    3
}
