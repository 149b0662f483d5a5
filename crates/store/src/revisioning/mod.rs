//! Revisioning strategies.
//!
//! A strategy decides which historical snapshots of a node page are needed to
//! rebuild it, and how those snapshots combine:
//!
//! | Strategy            | Window consulted                | Write page holds        |
//! |---------------------|---------------------------------|-------------------------|
//! | [`FullDump`]        | newest snapshot                 | every slot              |
//! | [`Differential`]    | newest + nearest full dump      | all changes since dump  |
//! | [`Incremental`]     | every snapshot to the last dump | only new changes        |
//! | [`SlidingSnapshot`] | last `revisions_to_restore`     | new + expiring slots    |
//!
//! Snapshots are always passed newest first, and slot resolution always
//! prefers the newest snapshot holding a value.

mod differential;
mod full_dump;
mod incremental;
mod sliding_snapshot;

use std::{fmt, sync::Arc};

pub use differential::Differential;
pub use full_dump::FullDump;
pub use incremental::Incremental;
use palimpsest_types::RevisioningKind;
pub use sliding_snapshot::SlidingSnapshot;

use crate::{
    error::Result,
    page::{NODE_PAGE_SLOTS, NodePage, NodePageContainer},
};

/// Reconstruction algorithm for node pages.
pub trait Revisioning: Send + Sync + fmt::Debug {
    /// The configuration value selecting this strategy.
    fn kind(&self) -> RevisioningKind;

    /// Pulls the snapshots this strategy needs from `snapshots`.
    ///
    /// `snapshots` yields the distinct stored snapshots of one page key,
    /// newest first, loading each lazily. Implementations stop pulling as
    /// soon as their window is complete.
    ///
    /// # Errors
    ///
    /// Propagates the first load failure from `snapshots`.
    fn collect_window(
        &self,
        snapshots: &mut dyn Iterator<Item = Result<NodePage>>,
        revisions_to_restore: u32,
    ) -> Result<Vec<NodePage>>;

    /// Rebuilds the complete page from a window, newest first.
    ///
    /// # Panics
    ///
    /// Panics if `pages` is empty.
    fn reconstruct_for_read(&self, pages: &[NodePage]) -> NodePage;

    /// Builds the {read, write} pair for a write transaction producing
    /// `new_revision`.
    ///
    /// # Panics
    ///
    /// Panics if `pages` is empty.
    fn reconstruct_for_write(
        &self,
        pages: &[NodePage],
        revisions_to_restore: u32,
        new_revision: u64,
        full_dump_required: bool,
    ) -> NodePageContainer;
}

/// Returns the strategy selected by `kind`.
pub fn strategy_for(kind: RevisioningKind) -> Arc<dyn Revisioning> {
    match kind {
        RevisioningKind::FullDump => Arc::new(FullDump),
        RevisioningKind::Differential => Arc::new(Differential),
        RevisioningKind::Incremental => Arc::new(Incremental),
        RevisioningKind::SlidingSnapshot => Arc::new(SlidingSnapshot),
    }
}

/// Returns true if `page` was written as a full dump.
pub(crate) fn is_full_dump(page: &NodePage, revisions_to_restore: u32) -> bool {
    page.revision() % u64::from(revisions_to_restore.max(1)) == 0
}

/// Newest-wins merge of `pages` into a page carrying `pages[0]`'s identity.
pub(crate) fn merge_newest_first(pages: &[NodePage]) -> NodePage {
    let newest = newest(pages);
    let mut merged = NodePage::new(newest.page_key(), newest.revision());
    for offset in 0..NODE_PAGE_SLOTS {
        if let Some(record) = pages.iter().find_map(|page| page.slot(offset)) {
            merged.set_slot(offset, Some(record.clone()));
        }
    }
    merged
}

/// Copies `page` under a new revision.
pub(crate) fn copy_for_revision(page: &NodePage, revision: u64) -> NodePage {
    let mut copy = NodePage::new(page.page_key(), revision);
    for (offset, record) in page.slots().enumerate() {
        copy.set_slot(offset, record.cloned());
    }
    copy
}

fn newest(pages: &[NodePage]) -> &NodePage {
    assert!(!pages.is_empty(), "revisioning needs at least one snapshot");
    &pages[0]
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
pub(crate) mod tests {
    use super::*;
    use crate::{error::Error, page::NodeRecord};

    /// Builds a snapshot from `(offset, value)` pairs.
    pub(crate) fn snapshot(page_key: u64, revision: u64, slots: &[(usize, &str)]) -> NodePage {
        let mut page = NodePage::new(page_key, revision);
        for (offset, value) in slots {
            page.set_slot(*offset, Some(NodeRecord::Data(value.as_bytes().to_vec())));
        }
        page
    }

    pub(crate) fn value(page: &NodePage, offset: usize) -> Option<&str> {
        page.slot(offset)
            .and_then(NodeRecord::data)
            .map(|bytes| std::str::from_utf8(bytes).expect("test values are UTF-8"))
    }

    /// Feeds `pages` through `collect_window` as an infallible source.
    pub(crate) fn window(
        strategy: &dyn Revisioning,
        pages: &[NodePage],
        revisions_to_restore: u32,
    ) -> Vec<NodePage> {
        let mut source = pages.iter().cloned().map(Ok::<_, Error>);
        strategy.collect_window(&mut source, revisions_to_restore).unwrap()
    }

    #[test]
    fn test_strategy_for_matches_kind() {
        for kind in [
            RevisioningKind::FullDump,
            RevisioningKind::Differential,
            RevisioningKind::Incremental,
            RevisioningKind::SlidingSnapshot,
        ] {
            assert_eq!(strategy_for(kind).kind(), kind);
        }
    }

    #[test]
    fn test_merge_prefers_newest_snapshot() {
        let pages = [snapshot(0, 3, &[(1, "a")]), snapshot(0, 1, &[(0, "b"), (1, "c")])];
        let merged = merge_newest_first(&pages);
        assert_eq!(value(&merged, 0), Some("b"));
        assert_eq!(value(&merged, 1), Some("a"));
        assert_eq!(merged.revision(), 3);
    }

    #[test]
    fn test_merge_keeps_newer_tombstone() {
        let mut newest = NodePage::new(0, 2);
        newest.set_slot(0, Some(NodeRecord::Deleted));
        let merged = merge_newest_first(&[newest, snapshot(0, 1, &[(0, "gone")])]);
        assert_eq!(merged.slot(0), Some(&NodeRecord::Deleted));
    }

    #[test]
    fn test_is_full_dump_uses_cadence() {
        assert!(is_full_dump(&NodePage::new(0, 0), 3));
        assert!(!is_full_dump(&NodePage::new(0, 4), 3));
        assert!(is_full_dump(&NodePage::new(0, 6), 3));
        assert!(is_full_dump(&NodePage::new(0, 5), 1));
    }

    #[test]
    #[should_panic(expected = "at least one snapshot")]
    fn test_empty_window_panics() {
        merge_newest_first(&[]);
    }

    #[test]
    fn test_window_stops_pulling_after_completion() {
        let mut pulled = 0;
        let pages = [snapshot(0, 2, &[]), snapshot(0, 1, &[]), snapshot(0, 0, &[])];
        let mut source = pages.iter().cloned().inspect(|_| pulled += 1).map(Ok::<_, Error>);
        let window = FullDump.collect_window(&mut source, 3).unwrap();
        assert_eq!(window.len(), 1);
        drop(source);
        assert_eq!(pulled, 1);
    }
}
