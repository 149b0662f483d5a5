//! Temporary storage directories for tests.
//!
//! A palimpsest storage is a directory, so most tests start from a
//! [`TestDir`]: a temporary directory that also hands out the session
//! config pointing at it and can damage the files inside it.

// Test utilities are expected to panic on failure - that's their purpose
#![allow(clippy::expect_used)]

use std::{
    fs::OpenOptions,
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use palimpsest_types::SessionConfig;
use tempfile::TempDir;

use crate::config::test_session_config;

/// A temporary storage directory, removed on drop.
///
/// # Example
///
/// ```
/// use palimpsest_test_utils::TestDir;
///
/// let dir = TestDir::new();
/// let session = dir.session();
/// assert_eq!(session.location, dir.path());
/// ```
pub struct TestDir {
    inner: TempDir,
}

impl TestDir {
    /// Creates a new temporary directory.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        let inner = TempDir::new().expect("failed to create temp directory");
        Self { inner }
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Joins a relative path to the directory.
    #[must_use]
    pub fn join<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        self.inner.path().join(path)
    }

    /// Session config for a storage located in this directory.
    #[must_use]
    pub fn session(&self) -> SessionConfig {
        test_session_config(self.path())
    }

    /// Size in bytes of `file` inside the directory.
    ///
    /// # Panics
    ///
    /// Panics if the file does not exist.
    #[must_use]
    pub fn file_len(&self, file: &str) -> u64 {
        std::fs::metadata(self.join(file)).expect("stat storage file").len()
    }

    /// Reads `len` bytes of `file` starting at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if the range cannot be read.
    #[must_use]
    pub fn read_at(&self, file: &str, offset: u64, len: usize) -> Vec<u8> {
        let mut handle = OpenOptions::new().read(true).open(self.join(file)).expect("open file");
        handle.seek(SeekFrom::Start(offset)).expect("seek");
        let mut buf = vec![0u8; len];
        handle.read_exact(&mut buf).expect("read range");
        buf
    }

    /// Overwrites `bytes` of `file` at `offset` and syncs, simulating a torn
    /// or corrupted write.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    pub fn overwrite_at(&self, file: &str, offset: u64, bytes: &[u8]) {
        let mut handle = OpenOptions::new().write(true).open(self.join(file)).expect("open file");
        handle.seek(SeekFrom::Start(offset)).expect("seek");
        handle.write_all(bytes).expect("overwrite range");
        handle.sync_all().expect("sync");
    }

    /// Flips every bit of the byte at `offset` in `file`.
    ///
    /// # Panics
    ///
    /// Panics if the byte cannot be read or written.
    pub fn flip_byte(&self, file: &str, offset: u64) {
        let byte = self.read_at(file, offset, 1)[0];
        self.overwrite_at(file, offset, &[!byte]);
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}
