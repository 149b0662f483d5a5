//! Page references, backend keys and checksums.

use std::fmt;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use snafu::ResultExt;

use super::Page;
use crate::error::{Error, Result, TruncatedSnafu};

/// Size of a page checksum in bytes (XXH3-128).
pub const CHECKSUM_SIZE: usize = 16;

const FILE_KEY_TAG: i32 = 1;
const KV_KEY_TAG: i32 = 2;
const NULL_KEY_TAG: i32 = 3;

/// XXH3-128 digest of a serialized page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Checksum([u8; CHECKSUM_SIZE]);

impl Checksum {
    /// Computes the checksum of `bytes`.
    pub fn of(bytes: &[u8]) -> Self {
        Self(xxhash_rust::xxh3::xxh3_128(bytes).to_be_bytes())
    }

    /// Wraps raw checksum bytes.
    pub fn from_bytes(bytes: [u8; CHECKSUM_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns the raw checksum bytes.
    pub fn as_bytes(&self) -> &[u8; CHECKSUM_SIZE] {
        &self.0
    }

    pub(crate) fn read_from(buf: &mut &[u8]) -> Result<Self> {
        let mut bytes = [0u8; CHECKSUM_SIZE];
        std::io::Read::read_exact(buf, &mut bytes).context(TruncatedSnafu { what: "checksum" })?;
        Ok(Self(bytes))
    }
}

/// Backend-specific locator of a persisted page. Immutable once assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    /// Byte range in the flat page file.
    File {
        /// Offset of the framed payload.
        offset: u64,
        /// Length of the framed payload.
        length: u32,
    },
    /// Row id in the key-value store.
    Kv {
        /// Row id; non-negative for pages.
        id: i64,
    },
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::File { offset, length } => write!(f, "file@{offset}+{length}"),
            Key::Kv { id } => write!(f, "kv#{id}"),
        }
    }
}

/// An indirection slot pointing at a page.
///
/// A reference is in one of three states:
///
/// - null: no key and no page
/// - dirty: an in-memory page that has not been written yet, no key
/// - committed: a key and checksum, with the page optionally loaded
///
/// Assigning a new page through [`set_page`](Self::set_page) drops the key,
/// so a reference is never both uncommitted and keyed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageReference {
    key: Option<Key>,
    checksum: Checksum,
    page: Option<Box<Page>>,
}

impl PageReference {
    /// Creates a null reference.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a dirty reference owning `page`.
    pub fn with_page(page: Page) -> Self {
        Self { key: None, checksum: Checksum::default(), page: Some(Box::new(page)) }
    }

    /// Creates a committed reference with no page loaded.
    pub fn committed(key: Key, checksum: Checksum) -> Self {
        Self { key: Some(key), checksum, page: None }
    }

    /// Returns the backend key, if the referenced page has been written.
    pub fn key(&self) -> Option<Key> {
        self.key
    }

    /// Returns the checksum recorded when the page was written.
    pub fn checksum(&self) -> Checksum {
        self.checksum
    }

    /// Returns the in-memory page, if any.
    pub fn page(&self) -> Option<&Page> {
        self.page.as_deref()
    }

    /// Returns the in-memory page mutably, if any.
    pub fn page_mut(&mut self) -> Option<&mut Page> {
        self.page.as_deref_mut()
    }

    /// Replaces the in-memory page, making the reference dirty.
    pub fn set_page(&mut self, page: Page) {
        self.key = None;
        self.checksum = Checksum::default();
        self.page = Some(Box::new(page));
    }

    /// Loads a page for a committed reference without making it dirty.
    pub(crate) fn attach_page(&mut self, page: Page) {
        self.page = Some(Box::new(page));
    }

    /// Takes the loaded page.
    pub(crate) fn into_page(self) -> Result<Page> {
        self.page.map(|page| *page).ok_or_else(|| Error::Corrupted {
            reason: "reference has no loaded page".to_string(),
        })
    }

    /// Drops the in-memory page, keeping key and checksum.
    pub fn clear_page(&mut self) {
        self.page = None;
    }

    /// Records where the page was written.
    pub fn set_committed(&mut self, key: Key, checksum: Checksum) {
        self.key = Some(key);
        self.checksum = checksum;
    }

    /// Returns true if the reference points nowhere.
    pub fn is_null(&self) -> bool {
        self.key.is_none() && self.page.is_none()
    }

    /// Returns true if the reference owns a page that still needs writing.
    pub fn is_dirty(&self) -> bool {
        self.key.is_none() && self.page.is_some()
    }

    /// Returns a copy holding only key and checksum.
    pub fn detached(&self) -> Self {
        Self { key: self.key, checksum: self.checksum, page: None }
    }

    pub(crate) fn write_to(&self, buf: &mut Vec<u8>) -> Result<()> {
        match self.key {
            Some(Key::File { offset, length }) => {
                buf.write_i32::<BigEndian>(FILE_KEY_TAG)?;
                buf.write_u64::<BigEndian>(offset)?;
                buf.write_u32::<BigEndian>(length)?;
            },
            Some(Key::Kv { id }) => {
                buf.write_i32::<BigEndian>(KV_KEY_TAG)?;
                buf.write_i64::<BigEndian>(id)?;
            },
            None => {
                buf.write_i32::<BigEndian>(NULL_KEY_TAG)?;
                return Ok(());
            },
        }
        buf.extend_from_slice(self.checksum.as_bytes());
        Ok(())
    }

    pub(crate) fn read_from(buf: &mut &[u8]) -> Result<Self> {
        const WHAT: &str = "page reference";
        let key = match buf.read_i32::<BigEndian>().context(TruncatedSnafu { what: WHAT })? {
            FILE_KEY_TAG => Key::File {
                offset: buf.read_u64::<BigEndian>().context(TruncatedSnafu { what: WHAT })?,
                length: buf.read_u32::<BigEndian>().context(TruncatedSnafu { what: WHAT })?,
            },
            KV_KEY_TAG => {
                Key::Kv { id: buf.read_i64::<BigEndian>().context(TruncatedSnafu { what: WHAT })? }
            },
            NULL_KEY_TAG => return Ok(Self::new()),
            tag => return Err(Error::UnknownKeyTag { tag }),
        };
        Ok(Self::committed(key, Checksum::read_from(buf)?))
    }

    /// Serializes the reference alone (key-kind tag, key, checksum).
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        Ok(buf)
    }

    /// Deserializes a reference produced by [`to_bytes`](Self::to_bytes).
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownKeyTag`] for an unrecognized key kind and
    /// [`Error::Truncated`] if the bytes end early.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut buf = bytes;
        let reference = Self::read_from(&mut buf)?;
        if !buf.is_empty() {
            return Err(Error::Corrupted {
                reason: format!("{} trailing bytes after page reference", buf.len()),
            });
        }
        Ok(reference)
    }
}
