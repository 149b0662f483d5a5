//! Leaf pages holding node records.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use snafu::ResultExt;

use super::{put_bytes, take_bytes};
use crate::error::{Error, Result, TruncatedSnafu};

/// Log2 of the number of node slots per page.
pub const NODE_PAGE_SLOTS_EXPONENT: u32 = 7;

/// Number of node slots per page.
pub const NODE_PAGE_SLOTS: usize = 1 << NODE_PAGE_SLOTS_EXPONENT;

const EMPTY_MARKER: u8 = 0;
const DATA_MARKER: u8 = 1;
const DELETED_MARKER: u8 = 2;

/// Splits a node key into its page key and in-page slot.
pub fn node_location(node_key: u64) -> (u64, usize) {
    (node_key >> NODE_PAGE_SLOTS_EXPONENT, (node_key & (NODE_PAGE_SLOTS as u64 - 1)) as usize)
}

/// Content of an occupied node slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeRecord {
    /// Opaque node bytes owned by the node model.
    Data(Vec<u8>),
    /// The node was removed in this snapshot's revision.
    Deleted,
}

impl NodeRecord {
    /// Returns the record bytes, or `None` for a tombstone.
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            NodeRecord::Data(bytes) => Some(bytes),
            NodeRecord::Deleted => None,
        }
    }
}

/// One snapshot of a node page.
///
/// Empty slots mean "unchanged in this snapshot" for partial strategies;
/// the revisioning strategy decides which older snapshot fills them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePage {
    page_key: u64,
    revision: u64,
    slots: Vec<Option<NodeRecord>>,
}

impl NodePage {
    /// Creates a page with every slot empty.
    pub fn new(page_key: u64, revision: u64) -> Self {
        Self { page_key, revision, slots: vec![None; NODE_PAGE_SLOTS] }
    }

    /// Returns the page key (the page's address in the indirection tree).
    pub fn page_key(&self) -> u64 {
        self.page_key
    }

    /// Returns the revision that produced this snapshot.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Returns the record at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `offset >= NODE_PAGE_SLOTS`.
    pub fn slot(&self, offset: usize) -> Option<&NodeRecord> {
        self.slots[offset].as_ref()
    }

    /// Replaces the record at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `offset >= NODE_PAGE_SLOTS`.
    pub fn set_slot(&mut self, offset: usize, record: Option<NodeRecord>) {
        self.slots[offset] = record;
    }

    /// Iterates over all slots in offset order.
    pub fn slots(&self) -> impl Iterator<Item = Option<&NodeRecord>> {
        self.slots.iter().map(Option::as_ref)
    }

    /// Number of occupied slots.
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub(crate) fn write_to(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.write_u64::<BigEndian>(self.page_key)?;
        buf.write_u64::<BigEndian>(self.revision)?;
        for slot in &self.slots {
            match slot {
                None => buf.push(EMPTY_MARKER),
                Some(NodeRecord::Data(bytes)) => {
                    buf.push(DATA_MARKER);
                    put_bytes(buf, bytes, "node record")?;
                },
                Some(NodeRecord::Deleted) => buf.push(DELETED_MARKER),
            }
        }
        Ok(())
    }

    pub(crate) fn read_from(buf: &mut &[u8]) -> Result<Self> {
        const WHAT: &str = "node page";
        let page_key = buf.read_u64::<BigEndian>().context(TruncatedSnafu { what: WHAT })?;
        let revision = buf.read_u64::<BigEndian>().context(TruncatedSnafu { what: WHAT })?;
        let mut slots = Vec::with_capacity(NODE_PAGE_SLOTS);
        for _ in 0..NODE_PAGE_SLOTS {
            let slot = match buf.read_u8().context(TruncatedSnafu { what: WHAT })? {
                EMPTY_MARKER => None,
                DATA_MARKER => Some(NodeRecord::Data(take_bytes(buf, WHAT)?)),
                DELETED_MARKER => Some(NodeRecord::Deleted),
                marker => {
                    return Err(Error::Corrupted {
                        reason: format!("invalid slot marker {marker} in node page {page_key}"),
                    });
                },
            };
            slots.push(slot);
        }
        Ok(Self { page_key, revision, slots })
    }
}
