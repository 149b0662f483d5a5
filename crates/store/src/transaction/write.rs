//! The single write transaction of a storage.

use std::collections::BTreeSet;

use parking_lot::MutexGuard;
use snafu::ResultExt;

use super::{
    PageResolver, collect_window, now_millis,
    tree::{commit_page, prepare_leaf},
};
use crate::{
    cache::{CacheStats, TransactionLogCache},
    error::{Error, ResolveSnafu, Result},
    io::Writer,
    page::{
        NamePage, NodePageContainer, NodeRecord, Page, PageReference, RevisionRootPage, UberPage,
        node_location,
    },
    storage::Storage,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    Committing,
    Aborting,
    Closed,
}

/// Builds the next revision on top of the latest committed one.
///
/// Node pages are fetched into a [`TransactionLogCache`] as
/// {complete, modified} containers, rebuilt by the storage's revisioning
/// strategy. Nothing is visible to other transactions until
/// [`commit`](Self::commit) publishes the new beacon.
///
/// Any failed operation leaves the transaction aborting: every later call
/// returns [`Error::TransactionAborted`]. Dropping an uncommitted
/// transaction aborts it.
pub struct WriteTransaction<'s> {
    storage: &'s Storage,
    _lock: MutexGuard<'s, ()>,
    resolver: PageResolver,
    writer: Box<dyn Writer>,
    revision: u64,
    root: RevisionRootPage,
    names: Option<NamePage>,
    names_dirty: bool,
    cache: TransactionLogCache,
    dirty: BTreeSet<u64>,
    state: State,
}

impl<'s> WriteTransaction<'s> {
    pub(crate) fn new(
        storage: &'s Storage,
        lock: MutexGuard<'s, ()>,
        resolver: PageResolver,
        writer: Box<dyn Writer>,
        cache: TransactionLogCache,
    ) -> Result<Self> {
        let base = resolver.latest_revision();
        let revision = base + 1;
        let root = resolver.revision_root(base)?.next(revision);
        Ok(Self {
            storage,
            _lock: lock,
            resolver,
            writer,
            revision,
            root,
            names: None,
            names_dirty: false,
            cache,
            dirty: BTreeSet::new(),
            state: State::Open,
        })
    }

    /// Revision this transaction will commit.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Latest committed revision this transaction builds on.
    pub fn base_revision(&self) -> u64 {
        self.resolver.latest_revision()
    }

    /// Highest node key allocated so far, including this transaction.
    pub fn max_node_key(&self) -> Option<u64> {
        self.root.max_node_key()
    }

    /// Cache counters for this transaction.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Returns the container for `page_key`, reconstructing it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Resolve`] if the page history cannot be loaded, or a
    /// cache error if the container cannot be stored.
    pub fn prepare_node_page(&mut self, page_key: u64) -> Result<NodePageContainer> {
        self.run(|txn| txn.container(page_key))
    }

    /// Returns the current record under `node_key`, including this
    /// transaction's changes.
    ///
    /// # Errors
    ///
    /// Returns any error from [`prepare_node_page`](Self::prepare_node_page).
    pub fn record(&mut self, node_key: u64) -> Result<Option<Vec<u8>>> {
        self.run(|txn| {
            let (page_key, offset) = node_location(node_key);
            let container = txn.container(page_key)?;
            Ok(container.record(offset).and_then(NodeRecord::data).map(<[u8]>::to_vec))
        })
    }

    /// Stores `data` under `node_key`.
    ///
    /// # Errors
    ///
    /// Returns any error from [`prepare_node_page`](Self::prepare_node_page).
    pub fn set_record(&mut self, node_key: u64, data: impl Into<Vec<u8>>) -> Result<()> {
        let data = data.into();
        self.run(|txn| {
            txn.put_record(node_key, NodeRecord::Data(data))?;
            if txn.root.max_node_key().is_none_or(|max| node_key > max) {
                txn.root.set_max_node_key(Some(node_key));
            }
            Ok(())
        })
    }

    /// Stores `data` under a newly allocated node key and returns the key.
    ///
    /// # Errors
    ///
    /// Returns any error from [`prepare_node_page`](Self::prepare_node_page).
    pub fn create_record(&mut self, data: impl Into<Vec<u8>>) -> Result<u64> {
        let data = data.into();
        self.run(|txn| {
            let node_key = txn.root.allocate_node_key();
            txn.put_record(node_key, NodeRecord::Data(data))?;
            Ok(node_key)
        })
    }

    /// Deletes the record under `node_key`. Returns false if there was none.
    ///
    /// # Errors
    ///
    /// Returns any error from [`prepare_node_page`](Self::prepare_node_page).
    pub fn remove_record(&mut self, node_key: u64) -> Result<bool> {
        self.run(|txn| {
            let (page_key, offset) = node_location(node_key);
            let exists =
                txn.container(page_key)?.record(offset).is_some_and(|r| r.data().is_some());
            if exists {
                txn.put_record(node_key, NodeRecord::Deleted)?;
            }
            Ok(exists)
        })
    }

    /// Adds `name` to the dictionary and returns its key.
    ///
    /// # Errors
    ///
    /// Returns an error if the committed dictionary cannot be loaded.
    pub fn create_name(&mut self, name: &str) -> Result<i32> {
        self.run(|txn| {
            let key = txn.names()?.create_name(name);
            txn.names_dirty = true;
            Ok(key)
        })
    }

    /// Looks up a name, including names created by this transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the committed dictionary cannot be loaded.
    pub fn name(&mut self, key: i32) -> Result<Option<String>> {
        self.run(|txn| Ok(txn.names()?.name(key).map(str::to_owned)))
    }

    /// Writes every modified page and publishes the new revision.
    ///
    /// Returns the committed revision.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if any page or the beacon cannot be written. The
    /// previous revision remains the latest and stays fully readable.
    pub fn commit(mut self) -> Result<u64> {
        if self.state != State::Open {
            return Err(Error::TransactionAborted);
        }
        self.state = State::Committing;
        match self.write_revision() {
            Ok(uber) => {
                self.storage.publish(uber);
                self.close();
                Ok(self.revision)
            },
            Err(err) => {
                self.state = State::Aborting;
                self.close();
                Err(err)
            },
        }
    }

    /// Discards every change.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache's overflow log cannot be removed.
    pub fn abort(mut self) -> Result<()> {
        self.state = State::Closed;
        self.cache.clear()
    }

    fn run<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.state != State::Open {
            return Err(Error::TransactionAborted);
        }
        op(self).inspect_err(|_| self.state = State::Aborting)
    }

    fn container(&mut self, page_key: u64) -> Result<NodePageContainer> {
        if let Some(container) = self.cache.get(page_key)? {
            return Ok(container);
        }
        let base = self.base_revision();
        let config = self.storage.config();
        let strategy = self.storage.revisioning();
        let window = collect_window(
            &self.resolver,
            strategy.as_ref(),
            page_key,
            base,
            config.revisions_to_restore,
        )
        .context(ResolveSnafu { page_key, revision: base })?;
        let container = if window.is_empty() {
            NodePageContainer::fresh(page_key, self.revision)
        } else {
            strategy.reconstruct_for_write(
                &window,
                config.revisions_to_restore,
                self.revision,
                config.is_full_dump_revision(self.revision),
            )
        };
        self.cache.put(page_key, container.clone())?;
        Ok(container)
    }

    fn put_record(&mut self, node_key: u64, record: NodeRecord) -> Result<()> {
        let (page_key, offset) = node_location(node_key);
        let mut container = self.container(page_key)?;
        container.modified_mut().set_slot(offset, Some(record));
        self.cache.put(page_key, container)?;
        self.dirty.insert(page_key);
        Ok(())
    }

    fn names(&mut self) -> Result<&mut NamePage> {
        let names = match self.names.take() {
            Some(names) => names,
            None => match self.resolver.name_page(self.base_revision())? {
                Some(committed) => committed.for_revision(self.revision),
                None => NamePage::new(self.revision),
            },
        };
        Ok(self.names.insert(names))
    }

    fn write_revision(&mut self) -> Result<UberPage> {
        let bootstrap = RevisionRootPage::bootstrap(self.revision);
        let mut root = std::mem::replace(&mut self.root, bootstrap);
        let mut written = 0;

        for page_key in std::mem::take(&mut self.dirty) {
            let container = self.cache.get(page_key)?.ok_or_else(|| Error::Corrupted {
                reason: format!("modified page {page_key} missing from transaction cache"),
            })?;
            let leaf = prepare_leaf(&self.resolver, root.node_tree_mut(), page_key, self.revision)?;
            leaf.set_page(Page::Node(container.into_modified()));
            written += commit_page(self.writer.as_mut(), leaf)?;
        }
        if self.names_dirty {
            if let Some(names) = self.names.take() {
                root.name_page_mut().set_page(Page::Name(names));
            }
        }
        root.set_commit_timestamp(now_millis());

        let mut uber = self.resolver.uber().next();
        prepare_leaf(&self.resolver, uber.revision_tree_mut(), self.revision, self.revision)?
            .set_page(Page::RevisionRoot(root));
        written += commit_page(self.writer.as_mut(), uber.revision_tree_mut())?;

        let committed = uber.clone();
        self.writer.write_first_reference(&mut PageReference::with_page(Page::Uber(uber)))?;
        written += 1;

        tracing::debug!(revision = self.revision, pages_written = written, "Committed revision");
        Ok(committed)
    }

    fn close(&mut self) {
        self.state = State::Closed;
        if let Err(err) = self.cache.clear() {
            tracing::warn!(
                revision = self.revision,
                error = %err,
                "Failed to clear transaction cache"
            );
        }
    }
}

impl Drop for WriteTransaction<'_> {
    fn drop(&mut self) {
        match self.state {
            State::Closed => {},
            State::Open => {
                tracing::warn!(
                    revision = self.revision,
                    "Write transaction dropped without commit or abort"
                );
                self.close();
            },
            State::Committing | State::Aborting => self.close(),
        }
    }
}

impl std::fmt::Debug for WriteTransaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteTransaction")
            .field("revision", &self.revision)
            .field("state", &self.state)
            .field("dirty_pages", &self.dirty.len())
            .finish_non_exhaustive()
    }
}
