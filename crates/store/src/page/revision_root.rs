//! Root page of one committed revision.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use snafu::ResultExt;

use super::PageReference;
use crate::error::{Error, Result, TruncatedSnafu};

/// One per committed revision; immutable once written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionRootPage {
    revision: u64,
    max_node_key: Option<u64>,
    commit_timestamp: u64,
    name_page: PageReference,
    node_tree: PageReference,
}

impl RevisionRootPage {
    /// Creates an empty root: no nodes, no names.
    pub fn bootstrap(revision: u64) -> Self {
        Self {
            revision,
            max_node_key: None,
            commit_timestamp: 0,
            name_page: PageReference::new(),
            node_tree: PageReference::new(),
        }
    }

    /// Copy-on-write successor: same trees, nothing loaded, new revision.
    pub fn next(&self, revision: u64) -> Self {
        Self {
            revision,
            max_node_key: self.max_node_key,
            commit_timestamp: 0,
            name_page: self.name_page.detached(),
            node_tree: self.node_tree.detached(),
        }
    }

    /// Revision this root describes.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Highest node key allocated up to this revision.
    pub fn max_node_key(&self) -> Option<u64> {
        self.max_node_key
    }

    /// Sets the highest allocated node key.
    pub fn set_max_node_key(&mut self, max_node_key: Option<u64>) {
        self.max_node_key = max_node_key;
    }

    /// Allocates the next node key.
    pub fn allocate_node_key(&mut self) -> u64 {
        let key = self.max_node_key.map_or(0, |max| max + 1);
        self.max_node_key = Some(key);
        key
    }

    /// Commit time in milliseconds since the Unix epoch.
    pub fn commit_timestamp(&self) -> u64 {
        self.commit_timestamp
    }

    /// Sets the commit time.
    pub fn set_commit_timestamp(&mut self, millis: u64) {
        self.commit_timestamp = millis;
    }

    /// Reference to the name dictionary.
    pub fn name_page(&self) -> &PageReference {
        &self.name_page
    }

    /// Reference to the name dictionary, mutably.
    pub fn name_page_mut(&mut self) -> &mut PageReference {
        &mut self.name_page
    }

    /// Reference to the node-page trie.
    pub fn node_tree(&self) -> &PageReference {
        &self.node_tree
    }

    /// Reference to the node-page trie, mutably.
    pub fn node_tree_mut(&mut self) -> &mut PageReference {
        &mut self.node_tree
    }

    pub(crate) fn write_to(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.write_u64::<BigEndian>(self.revision)?;
        buf.write_i64::<BigEndian>(self.max_node_key.map_or(-1, |key| key as i64))?;
        buf.write_u64::<BigEndian>(self.commit_timestamp)?;
        self.name_page.write_to(buf)?;
        self.node_tree.write_to(buf)
    }

    pub(crate) fn read_from(buf: &mut &[u8]) -> Result<Self> {
        const WHAT: &str = "revision root page";
        let revision = buf.read_u64::<BigEndian>().context(TruncatedSnafu { what: WHAT })?;
        let raw_max_node_key =
            buf.read_i64::<BigEndian>().context(TruncatedSnafu { what: WHAT })?;
        let max_node_key = match raw_max_node_key {
            -1 => None,
            key if key >= 0 => Some(key as u64),
            key => {
                return Err(Error::Corrupted {
                    reason: format!("revision {revision} has negative max node key {key}"),
                });
            },
        };
        let commit_timestamp =
            buf.read_u64::<BigEndian>().context(TruncatedSnafu { what: WHAT })?;
        let name_page = PageReference::read_from(buf)?;
        let node_tree = PageReference::read_from(buf)?;
        Ok(Self { revision, max_node_key, commit_timestamp, name_page, node_tree })
    }
}
