//! Read transactions pinned to one committed revision.

use std::{cell::RefCell, collections::HashMap, sync::Arc};

use snafu::ResultExt;

use super::{PageResolver, collect_window};
use crate::{
    error::{ResolveSnafu, Result},
    page::{NodePage, NodeRecord, RevisionRootPage, node_location},
    revisioning::Revisioning,
};

/// A consistent view of one committed revision.
///
/// Later commits never affect what a read transaction sees. Reconstructed
/// node pages are kept for the transaction's lifetime.
pub struct ReadTransaction {
    resolver: PageResolver,
    root: Arc<RevisionRootPage>,
    strategy: Arc<dyn Revisioning>,
    revisions_to_restore: u32,
    pages: RefCell<HashMap<u64, Option<Arc<NodePage>>>>,
}

impl ReadTransaction {
    pub(crate) fn new(
        resolver: PageResolver,
        revision: u64,
        strategy: Arc<dyn Revisioning>,
        revisions_to_restore: u32,
    ) -> Result<Self> {
        let root = resolver.revision_root(revision)?;
        Ok(Self { resolver, root, strategy, revisions_to_restore, pages: RefCell::default() })
    }

    /// Revision this transaction is pinned to.
    pub fn revision(&self) -> u64 {
        self.root.revision()
    }

    /// Highest node key allocated up to this revision.
    pub fn max_node_key(&self) -> Option<u64> {
        self.root.max_node_key()
    }

    /// Commit time of this revision, in milliseconds since the Unix epoch.
    pub fn commit_timestamp(&self) -> u64 {
        self.root.commit_timestamp()
    }

    /// Reconstructs the node page stored under `page_key`.
    ///
    /// Returns `None` if the page key has never been written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Resolve`](crate::Error::Resolve) carrying the page key
    /// and revision if any snapshot cannot be loaded.
    pub fn node_page(&self, page_key: u64) -> Result<Option<Arc<NodePage>>> {
        if let Some(page) = self.pages.borrow().get(&page_key) {
            return Ok(page.clone());
        }
        let revision = self.revision();
        let window = collect_window(
            &self.resolver,
            self.strategy.as_ref(),
            page_key,
            revision,
            self.revisions_to_restore,
        )
        .context(ResolveSnafu { page_key, revision })?;
        let page = (!window.is_empty())
            .then(|| Arc::new(self.strategy.reconstruct_for_read(&window)));
        self.pages.borrow_mut().insert(page_key, page.clone());
        Ok(page)
    }

    /// Returns the record stored under `node_key`.
    ///
    /// Deleted and never-written records both read as `None`.
    ///
    /// # Errors
    ///
    /// Returns any error from [`node_page`](Self::node_page).
    pub fn record(&self, node_key: u64) -> Result<Option<Vec<u8>>> {
        let (page_key, offset) = node_location(node_key);
        let Some(page) = self.node_page(page_key)? else {
            return Ok(None);
        };
        Ok(page.slot(offset).and_then(NodeRecord::data).map(<[u8]>::to_vec))
    }

    /// Looks up a name in this revision's dictionary.
    ///
    /// # Errors
    ///
    /// Returns an error if the name page cannot be loaded.
    pub fn name(&self, key: i32) -> Result<Option<String>> {
        let names = self.resolver.name_page(self.revision())?;
        Ok(names.and_then(|page| page.name(key).map(str::to_owned)))
    }
}

impl std::fmt::Debug for ReadTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadTransaction")
            .field("revision", &self.revision())
            .field("strategy", &self.strategy.kind())
            .finish_non_exhaustive()
    }
}
