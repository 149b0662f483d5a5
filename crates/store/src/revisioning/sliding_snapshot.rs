//! Sliding-snapshot revisioning: a fixed window of recent snapshots.

use palimpsest_types::RevisioningKind;

use super::{Revisioning, merge_newest_first};
use crate::{
    error::Result,
    page::{NODE_PAGE_SLOTS, NodePage, NodePageContainer},
};

/// Reads merge the last `revisions_to_restore` snapshots regardless of
/// full-dump boundaries.
///
/// Once the window is full, a slot held only by its oldest snapshot is
/// rematerialized into the write page, since that snapshot leaves the window
/// with the next revision.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlidingSnapshot;

impl Revisioning for SlidingSnapshot {
    fn kind(&self) -> RevisioningKind {
        RevisioningKind::SlidingSnapshot
    }

    fn collect_window(
        &self,
        snapshots: &mut dyn Iterator<Item = Result<NodePage>>,
        revisions_to_restore: u32,
    ) -> Result<Vec<NodePage>> {
        snapshots.take(revisions_to_restore.max(1) as usize).collect()
    }

    fn reconstruct_for_read(&self, pages: &[NodePage]) -> NodePage {
        merge_newest_first(pages)
    }

    fn reconstruct_for_write(
        &self,
        pages: &[NodePage],
        revisions_to_restore: u32,
        new_revision: u64,
        _full_dump_required: bool,
    ) -> NodePageContainer {
        let complete = merge_newest_first(pages);
        let mut modified = NodePage::new(complete.page_key(), new_revision);

        let window_full = pages.len() >= revisions_to_restore.max(1) as usize;
        if let Some((oldest, newer)) = pages.split_last().filter(|_| window_full) {
            for offset in 0..NODE_PAGE_SLOTS {
                let Some(record) = oldest.slot(offset) else { continue };
                if newer.iter().all(|page| page.slot(offset).is_none()) {
                    modified.set_slot(offset, Some(record.clone()));
                }
            }
        }
        NodePageContainer::new(complete, modified)
    }
}
