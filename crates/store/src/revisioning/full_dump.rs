//! Full-dump revisioning: every snapshot is complete.

use palimpsest_types::RevisioningKind;

use super::{Revisioning, copy_for_revision, merge_newest_first};
use crate::{
    error::Result,
    page::{NodePage, NodePageContainer},
};

/// Stores every slot in every revision; reads consult one snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullDump;

impl Revisioning for FullDump {
    fn kind(&self) -> RevisioningKind {
        RevisioningKind::FullDump
    }

    fn collect_window(
        &self,
        snapshots: &mut dyn Iterator<Item = Result<NodePage>>,
        _revisions_to_restore: u32,
    ) -> Result<Vec<NodePage>> {
        snapshots.take(1).collect()
    }

    fn reconstruct_for_read(&self, pages: &[NodePage]) -> NodePage {
        merge_newest_first(&pages[..1.min(pages.len())])
    }

    fn reconstruct_for_write(
        &self,
        pages: &[NodePage],
        _revisions_to_restore: u32,
        new_revision: u64,
        _full_dump_required: bool,
    ) -> NodePageContainer {
        let complete = self.reconstruct_for_read(pages);
        let modified = copy_for_revision(&complete, new_revision);
        NodePageContainer::new(complete, modified)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::{
        page::{NODE_PAGE_SLOTS, NodeRecord},
        revisioning::tests::{snapshot, value, window},
    };

    #[test]
    fn test_window_is_newest_snapshot_only() {
        let pages = [snapshot(0, 5, &[(0, "new")]), snapshot(0, 4, &[(0, "old")])];
        let window = window(&FullDump, &pages, 4);
        assert_eq!(window, vec![pages[0].clone()]);
    }

    #[test]
    fn test_write_page_copies_every_slot() {
        let pages = [snapshot(2, 5, &[(0, "a"), (9, "b")])];
        let container = FullDump.reconstruct_for_write(&pages, 4, 6, false);
        assert_eq!(container.complete(), &pages[0]);
        assert_eq!(container.modified().revision(), 6);
        assert_eq!(value(container.modified(), 0), Some("a"));
        assert_eq!(value(container.modified(), 9), Some("b"));
    }

    proptest! {
        #[test]
        fn prop_read_of_single_snapshot_is_identity(
            revision in any::<u64>(),
            occupied in proptest::collection::btree_map(
                0..NODE_PAGE_SLOTS,
                proptest::collection::vec(any::<u8>(), 0..8),
                0..16,
            ),
        ) {
            let mut page = NodePage::new(11, revision);
            for (offset, bytes) in occupied {
                page.set_slot(offset, Some(NodeRecord::Data(bytes)));
            }
            prop_assert_eq!(FullDump.reconstruct_for_read(std::slice::from_ref(&page)), page);
        }
    }
}
