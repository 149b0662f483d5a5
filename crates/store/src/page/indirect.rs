//! Fixed-fanout indirection pages.
//!
//! Both node pages within a revision and revision roots within a storage are
//! addressed through a trie of [`IndirectPage`]s, [`INDIRECT_LEVELS`] deep,
//! each level consuming [`INDIRECT_FANOUT_EXPONENT`] bits of the key.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use snafu::ResultExt;

use super::PageReference;
use crate::error::{Error, Result, TruncatedSnafu};

/// Log2 of the number of children per indirect page.
pub const INDIRECT_FANOUT_EXPONENT: u32 = 7;

/// Number of children per indirect page.
pub const INDIRECT_FANOUT: usize = 1 << INDIRECT_FANOUT_EXPONENT;

/// Depth of the indirection trie.
pub const INDIRECT_LEVELS: usize = 5;

/// Largest key addressable by the trie.
pub const MAX_PAGE_KEY: u64 = (1 << (INDIRECT_FANOUT_EXPONENT as usize * INDIRECT_LEVELS)) - 1;

/// Returns the child offset to follow at each level, root first.
///
/// # Errors
///
/// Returns [`Error::PageKeyOutOfRange`] if `key > MAX_PAGE_KEY`.
pub fn level_offsets(key: u64) -> Result<[usize; INDIRECT_LEVELS]> {
    if key > MAX_PAGE_KEY {
        return Err(Error::PageKeyOutOfRange { key });
    }
    let mask = INDIRECT_FANOUT as u64 - 1;
    let mut offsets = [0usize; INDIRECT_LEVELS];
    for (level, offset) in offsets.iter_mut().enumerate() {
        let shift = INDIRECT_FANOUT_EXPONENT as usize * (INDIRECT_LEVELS - 1 - level);
        *offset = ((key >> shift) & mask) as usize;
    }
    Ok(offsets)
}

/// A trie node holding [`INDIRECT_FANOUT`] child references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndirectPage {
    revision: u64,
    references: Vec<PageReference>,
}

impl IndirectPage {
    /// Creates a page whose children are all null.
    pub fn new(revision: u64) -> Self {
        Self { revision, references: vec![PageReference::new(); INDIRECT_FANOUT] }
    }

    /// Returns the revision that produced this page.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Copy-on-write clone for `revision`: same children, nothing loaded.
    pub fn for_revision(&self, revision: u64) -> Self {
        Self { revision, references: self.references.iter().map(PageReference::detached).collect() }
    }

    /// Returns the child reference at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `offset >= INDIRECT_FANOUT`.
    pub fn reference(&self, offset: usize) -> &PageReference {
        &self.references[offset]
    }

    /// Returns the child reference at `offset` mutably.
    ///
    /// # Panics
    ///
    /// Panics if `offset >= INDIRECT_FANOUT`.
    pub fn reference_mut(&mut self, offset: usize) -> &mut PageReference {
        &mut self.references[offset]
    }

    /// Iterates over the children mutably, in offset order.
    pub fn references_mut(&mut self) -> impl Iterator<Item = &mut PageReference> {
        self.references.iter_mut()
    }

    /// Iterates over the children in offset order.
    pub fn references(&self) -> impl Iterator<Item = &PageReference> {
        self.references.iter()
    }

    pub(crate) fn write_to(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.write_u64::<BigEndian>(self.revision)?;
        for reference in &self.references {
            reference.write_to(buf)?;
        }
        Ok(())
    }

    pub(crate) fn read_from(buf: &mut &[u8]) -> Result<Self> {
        let revision =
            buf.read_u64::<BigEndian>().context(TruncatedSnafu { what: "indirect page" })?;
        let references = (0..INDIRECT_FANOUT)
            .map(|_| PageReference::read_from(buf))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { revision, references })
    }
}
