//! Page containers used by open write transactions.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use snafu::ResultExt;

use super::{NodePage, NodeRecord, checked_len};
use crate::error::{Error, Result, TruncatedSnafu};

/// The {read, write} pair for one page key inside a write transaction.
///
/// `complete` is the historical reconstruction and is never mutated.
/// `modified` collects the slots the new revision will persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePageContainer {
    complete: NodePage,
    modified: NodePage,
}

impl NodePageContainer {
    /// Pairs a reconstructed page with the page the new revision will write.
    pub fn new(complete: NodePage, modified: NodePage) -> Self {
        Self { complete, modified }
    }

    /// Container for a page key with no history.
    pub fn fresh(page_key: u64, revision: u64) -> Self {
        let page = NodePage::new(page_key, revision);
        Self { complete: page.clone(), modified: page }
    }

    /// Page key shared by both halves.
    pub fn page_key(&self) -> u64 {
        self.complete.page_key()
    }

    /// Historical reconstruction.
    pub fn complete(&self) -> &NodePage {
        &self.complete
    }

    /// Page receiving this transaction's changes.
    pub fn modified(&self) -> &NodePage {
        &self.modified
    }

    /// Page receiving this transaction's changes, mutably.
    pub fn modified_mut(&mut self) -> &mut NodePage {
        &mut self.modified
    }

    /// Consumes the container, returning the page to persist.
    pub fn into_modified(self) -> NodePage {
        self.modified
    }

    /// Current view of a slot: this transaction's change, else history.
    pub fn record(&self, offset: usize) -> Option<&NodeRecord> {
        self.modified.slot(offset).or_else(|| self.complete.slot(offset))
    }

    /// Encodes both halves for the overflow log.
    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut complete = Vec::new();
        self.complete.write_to(&mut complete)?;
        let mut buf = Vec::with_capacity(complete.len() + 4);
        buf.write_u32::<BigEndian>(checked_len(complete.len(), "page container")?)?;
        buf.extend_from_slice(&complete);
        self.modified.write_to(&mut buf)?;
        Ok(buf)
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut buf = bytes;
        let complete_len =
            buf.read_u32::<BigEndian>().context(TruncatedSnafu { what: "page container" })?;
        let mut complete_bytes = buf.get(..complete_len as usize).ok_or_else(|| {
            Error::Corrupted { reason: "page container shorter than its header".to_string() }
        })?;
        let complete = NodePage::read_from(&mut complete_bytes)?;
        buf = &buf[complete_len as usize..];
        let modified = NodePage::read_from(&mut buf)?;
        if !buf.is_empty() || !complete_bytes.is_empty() {
            return Err(Error::Corrupted {
                reason: "trailing bytes in page container".to_string(),
            });
        }
        Ok(Self { complete, modified })
    }
}
