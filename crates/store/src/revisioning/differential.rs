//! Differential revisioning: each snapshot holds every change since the
//! last full dump.

use palimpsest_types::RevisioningKind;

use super::{Revisioning, copy_for_revision, is_full_dump, merge_newest_first};
use crate::{
    error::Result,
    page::{NodePage, NodePageContainer},
};

/// Reads combine the newest snapshot with one reference snapshot: the
/// nearest full dump, or the page's oldest snapshot when none exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct Differential;

impl Revisioning for Differential {
    fn kind(&self) -> RevisioningKind {
        RevisioningKind::Differential
    }

    fn collect_window(
        &self,
        snapshots: &mut dyn Iterator<Item = Result<NodePage>>,
        revisions_to_restore: u32,
    ) -> Result<Vec<NodePage>> {
        let Some(newest) = snapshots.next().transpose()? else {
            return Ok(Vec::new());
        };
        if is_full_dump(&newest, revisions_to_restore) {
            return Ok(vec![newest]);
        }

        let mut reference = None;
        for snapshot in snapshots {
            let snapshot = snapshot?;
            let done = is_full_dump(&snapshot, revisions_to_restore);
            reference = Some(snapshot);
            if done {
                break;
            }
        }
        Ok(std::iter::once(newest).chain(reference).collect())
    }

    fn reconstruct_for_read(&self, pages: &[NodePage]) -> NodePage {
        merge_newest_first(pages)
    }

    fn reconstruct_for_write(
        &self,
        pages: &[NodePage],
        _revisions_to_restore: u32,
        new_revision: u64,
        full_dump_required: bool,
    ) -> NodePageContainer {
        let complete = merge_newest_first(pages);
        // Otherwise the newest snapshot is carried forward so the next diff
        // still covers everything since the reference snapshot.
        let modified = if full_dump_required {
            copy_for_revision(&complete, new_revision)
        } else {
            copy_for_revision(&pages[0], new_revision)
        };
        NodePageContainer::new(complete, modified)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::{
        page::NodeRecord,
        revisioning::tests::{snapshot, value, window},
    };

    #[test]
    fn test_window_is_newest_and_nearest_full_dump() {
        let pages = [
            snapshot(0, 5, &[(0, "r5")]),
            snapshot(0, 4, &[(0, "r4")]),
            snapshot(0, 3, &[(0, "r3")]),
            snapshot(0, 1, &[(0, "r1")]),
        ];
        let window = window(&Differential, &pages, 3);
        let revisions: Vec<_> = window.iter().map(NodePage::revision).collect();
        assert_eq!(revisions, vec![5, 3]);
    }

    #[test]
    fn test_window_stops_at_full_dump_newest() {
        let pages = [snapshot(0, 6, &[]), snapshot(0, 5, &[])];
        assert_eq!(window(&Differential, &pages, 3).len(), 1);
    }

    #[test]
    fn test_window_falls_back_to_oldest_snapshot() {
        let pages = [snapshot(0, 8, &[]), snapshot(0, 7, &[]), snapshot(0, 5, &[])];
        let window = window(&Differential, &pages, 3);
        let revisions: Vec<_> = window.iter().map(NodePage::revision).collect();
        assert_eq!(revisions, vec![8, 5]);
    }

    #[test]
    fn test_read_prefers_newest_then_full_dump() {
        let pages = [snapshot(0, 4, &[(1, "diff")]), snapshot(0, 3, &[(0, "x"), (1, "dump")])];
        let page = Differential.reconstruct_for_read(&pages);
        assert_eq!(value(&page, 0), Some("x"));
        assert_eq!(value(&page, 1), Some("diff"));
        assert_eq!(page.revision(), 4);
    }

    #[test]
    fn test_write_propagates_newest_diff() {
        let pages = [snapshot(0, 4, &[(1, "diff")]), snapshot(0, 3, &[(0, "x")])];
        let container = Differential.reconstruct_for_write(&pages, 3, 5, false);
        assert_eq!(value(container.modified(), 1), Some("diff"));
        assert_eq!(value(container.modified(), 0), None);
        assert_eq!(value(container.complete(), 0), Some("x"));
    }

    #[test]
    fn test_write_after_full_dump_propagates_newest() {
        let pages = [snapshot(0, 3, &[(0, "x")])];
        let container = Differential.reconstruct_for_write(&pages, 3, 4, false);
        assert_eq!(value(container.modified(), 0), Some("x"));
        assert_eq!(container.modified().revision(), 4);
        assert_eq!(value(container.complete(), 0), Some("x"));
    }

    #[test]
    fn test_write_after_full_dump_keeps_history_readable() {
        // Revision 4 overwrites slot 1 on top of the dump at 3; revision 5
        // reads through [4, 3] and must still see slot 0.
        let dump = snapshot(0, 3, &[(0, "x"), (1, "old")]);
        let mut container = Differential.reconstruct_for_write(&[dump.clone()], 3, 4, false);
        container.modified_mut().set_slot(1, Some(NodeRecord::Data(b"new".to_vec())));
        let diff = container.into_modified();

        let page = Differential.reconstruct_for_read(&[diff, dump]);
        assert_eq!(value(&page, 0), Some("x"));
        assert_eq!(value(&page, 1), Some("new"));
    }

    #[test]
    fn test_full_dump_write_copies_everything() {
        let pages = [snapshot(0, 4, &[(1, "diff")]), snapshot(0, 3, &[(0, "x")])];
        let container = Differential.reconstruct_for_write(&pages, 3, 6, true);
        assert_eq!(value(container.modified(), 0), Some("x"));
        assert_eq!(value(container.modified(), 1), Some("diff"));
        assert_eq!(container.modified().revision(), 6);
    }
}
