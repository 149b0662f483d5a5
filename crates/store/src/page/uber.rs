//! Storage root page.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use snafu::ResultExt;

use super::PageReference;
use crate::error::{Result, TruncatedSnafu};

/// The single mutable root of a storage.
///
/// Holds the number of committed revisions and the trie whose leaves are
/// [`RevisionRootPage`](super::RevisionRootPage)s, addressed by revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UberPage {
    revision_count: u64,
    revision_tree: PageReference,
}

impl UberPage {
    /// Creates the root of a fresh storage, which holds revision 0 only.
    pub fn bootstrap() -> Self {
        Self { revision_count: 1, revision_tree: PageReference::new() }
    }

    /// Number of committed revisions.
    pub fn revision_count(&self) -> u64 {
        self.revision_count
    }

    /// Latest committed revision.
    pub fn latest_revision(&self) -> u64 {
        self.revision_count.saturating_sub(1)
    }

    /// Sets the revision count.
    pub fn set_revision_count(&mut self, revision_count: u64) {
        self.revision_count = revision_count;
    }

    /// Reference to the revision trie.
    pub fn revision_tree(&self) -> &PageReference {
        &self.revision_tree
    }

    /// Reference to the revision trie, mutably.
    pub fn revision_tree_mut(&mut self) -> &mut PageReference {
        &mut self.revision_tree
    }

    /// Root for the next revision, sharing the committed revision trie.
    pub fn next(&self) -> Self {
        Self {
            revision_count: self.revision_count + 1,
            revision_tree: self.revision_tree.detached(),
        }
    }

    pub(crate) fn write_to(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.write_u64::<BigEndian>(self.revision_count)?;
        self.revision_tree.write_to(buf)
    }

    pub(crate) fn read_from(buf: &mut &[u8]) -> Result<Self> {
        let revision_count =
            buf.read_u64::<BigEndian>().context(TruncatedSnafu { what: "uber page" })?;
        let revision_tree = PageReference::read_from(buf)?;
        Ok(Self { revision_count, revision_tree })
    }
}
