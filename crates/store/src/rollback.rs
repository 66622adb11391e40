//! Tentative mutations and their undo records.
//!
//! Every mutating store command applies its change to the in-memory asset
//! straight away and keeps a [`Tentative`] describing how to take back
//! exactly that change. If persistence fails the record is reverted; if it
//! succeeds the record is settled and dropped.
//!
//! Undo never restores a whole-asset snapshot. Additions are removed by id,
//! so concurrent additions survive. Single-valued fields (asset status,
//! thread state) go through the [`WriteLog`], which keeps the pending
//! writes to each field in order so that a failure only shows through when
//! no newer local write covers it.

use std::collections::HashMap;

use reelnote_core::review::{AssetStatus, ThreadState};
use reelnote_core::types::EntityId;

use crate::store::ReviewState;

/// A single-valued field that several commands may race to set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Field {
    Status,
    ThreadState(EntityId),
}

/// The value a field held before a write replaced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldValue {
    Status(AssetStatus),
    ThreadState(ThreadState),
}

/// Handle for one pending write, issued by [`WriteLog::claim`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Claim(u64);

#[derive(Debug)]
struct Pending {
    claim: Claim,
    previous: FieldValue,
}

/// Pending local writes per field, oldest first.
#[derive(Debug, Default)]
pub(crate) struct WriteLog {
    seq: u64,
    chains: HashMap<Field, Vec<Pending>>,
}

impl WriteLog {
    /// Record a new local write to `field`, which held `previous`.
    pub(crate) fn claim(&mut self, field: Field, previous: FieldValue) -> Claim {
        self.seq += 1;
        let claim = Claim(self.seq);
        self.chains
            .entry(field)
            .or_default()
            .push(Pending { claim, previous });
        claim
    }

    /// Whether a local write to `field` is still awaiting confirmation.
    pub(crate) fn is_pending(&self, field: Field) -> bool {
        self.chains.contains_key(&field)
    }

    fn position(&self, field: Field, claim: Claim) -> Option<usize> {
        self.chains
            .get(&field)?
            .iter()
            .position(|p| p.claim == claim)
    }

    /// The write was confirmed. It and every older pending write no longer
    /// matter for what the field should show.
    pub(crate) fn settle(&mut self, field: Field, claim: Claim) {
        let Some(index) = self.position(field, claim) else {
            return;
        };
        if let Some(chain) = self.chains.get_mut(&field) {
            chain.drain(..=index);
            if chain.is_empty() {
                self.chains.remove(&field);
            }
        }
    }

    /// The write failed. Returns the value to put back when it is the newest
    /// pending write; otherwise its restore point passes to the next newer
    /// write and nothing visible changes.
    pub(crate) fn fail(&mut self, field: Field, claim: Claim) -> Option<FieldValue> {
        let index = self.position(field, claim)?;
        let chain = self.chains.get_mut(&field)?;
        let failed = chain.remove(index);
        let restore = match chain.get_mut(index) {
            Some(newer) => {
                newer.previous = failed.previous;
                None
            }
            None => Some(failed.previous),
        };
        if chain.is_empty() {
            self.chains.remove(&field);
        }
        restore
    }

    /// Forget every pending write, e.g. after the asset was reloaded.
    pub(crate) fn clear(&mut self) {
        self.chains.clear();
    }
}

/// How to undo one optimistic mutation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Rollback {
    RemoveThread {
        thread_id: EntityId,
    },
    RemoveComment {
        thread_id: EntityId,
        comment_id: EntityId,
    },
    RemoveShapes {
        thread_id: EntityId,
        shape_ids: Vec<EntityId>,
    },
    RestoreThreadState {
        thread_id: EntityId,
        claim: Claim,
    },
    RestoreStatus {
        claim: Claim,
    },
}

/// An applied-but-unconfirmed mutation against a specific asset.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Tentative {
    pub(crate) asset_id: EntityId,
    pub(crate) rollback: Rollback,
}

impl Tentative {
    pub(crate) fn new(asset_id: EntityId, rollback: Rollback) -> Self {
        Self { asset_id, rollback }
    }

    /// Persistence confirmed the mutation.
    pub(crate) fn settle(&self, writes: &mut WriteLog) {
        match &self.rollback {
            Rollback::RestoreThreadState { thread_id, claim } => {
                writes.settle(Field::ThreadState(*thread_id), *claim)
            }
            Rollback::RestoreStatus { claim } => writes.settle(Field::Status, *claim),
            Rollback::RemoveThread { .. }
            | Rollback::RemoveComment { .. }
            | Rollback::RemoveShapes { .. } => {}
        }
    }

    /// Undo the mutation. Returns `false` when nothing visible changed: the
    /// asset was replaced, the entity is gone, or a newer write covers the
    /// field.
    pub(crate) fn revert(self, view: &mut ReviewState, writes: &mut WriteLog) -> bool {
        let Some(asset) = view.asset.as_mut().filter(|a| a.id == self.asset_id) else {
            return false;
        };

        match self.rollback {
            Rollback::RemoveThread { thread_id } => {
                let before = asset.threads.len();
                asset.threads.retain(|t| t.id != thread_id);
                if view.selected_thread_id == Some(thread_id) {
                    view.selected_thread_id = None;
                }
                asset.threads.len() != before
            }
            Rollback::RemoveComment {
                thread_id,
                comment_id,
            } => {
                let Some(thread) = asset.thread_mut(thread_id) else {
                    return false;
                };
                let before = thread.comments.len();
                thread.comments.retain(|c| c.id != comment_id);
                thread.comments.len() != before
            }
            Rollback::RemoveShapes {
                thread_id,
                shape_ids,
            } => {
                let Some(thread) = asset.thread_mut(thread_id) else {
                    return false;
                };
                let before = thread.shapes.len();
                thread.shapes.retain(|s| !shape_ids.contains(&s.id()));
                thread.shapes.len() != before
            }
            Rollback::RestoreThreadState { thread_id, claim } => {
                let Some(FieldValue::ThreadState(previous)) =
                    writes.fail(Field::ThreadState(thread_id), claim)
                else {
                    return false;
                };
                match asset.thread_mut(thread_id) {
                    Some(thread) => {
                        thread.state = previous;
                        true
                    }
                    None => false,
                }
            }
            Rollback::RestoreStatus { claim } => {
                let Some(FieldValue::Status(previous)) = writes.fail(Field::Status, claim) else {
                    return false;
                };
                asset.status = previous;
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelnote_core::review::ReviewAsset;

    fn view_with_status(status: AssetStatus) -> ReviewState {
        let mut asset = ReviewAsset::new("Teaser", "https://cdn.example/t.mp4", 12.0, 1280.0, 720.0);
        asset.status = status;
        ReviewState {
            asset: Some(asset),
            ..Default::default()
        }
    }

    fn set_status(view: &mut ReviewState, writes: &mut WriteLog, status: AssetStatus) -> Tentative {
        let asset = view.asset.as_mut().unwrap();
        let previous = asset.status;
        asset.status = status;
        let claim = writes.claim(Field::Status, FieldValue::Status(previous));
        Tentative::new(asset.id, Rollback::RestoreStatus { claim })
    }

    fn status(view: &ReviewState) -> AssetStatus {
        view.asset.as_ref().unwrap().status
    }

    #[test]
    fn lone_failed_write_is_restored() {
        let mut view = view_with_status(AssetStatus::InReview);
        let mut writes = WriteLog::default();

        let t = set_status(&mut view, &mut writes, AssetStatus::Approved);
        assert!(t.revert(&mut view, &mut writes));
        assert_eq!(status(&view), AssetStatus::InReview);
    }

    #[test]
    fn newer_write_wins_over_older_failure() {
        let mut view = view_with_status(AssetStatus::InReview);
        let mut writes = WriteLog::default();

        let older = set_status(&mut view, &mut writes, AssetStatus::Approved);
        let newer = set_status(&mut view, &mut writes, AssetStatus::ChangesRequested);

        assert!(!older.revert(&mut view, &mut writes));
        newer.settle(&mut writes);
        assert_eq!(status(&view), AssetStatus::ChangesRequested);
    }

    #[test]
    fn failures_unwind_in_reverse_order() {
        let mut view = view_with_status(AssetStatus::InReview);
        let mut writes = WriteLog::default();

        let first = set_status(&mut view, &mut writes, AssetStatus::Approved);
        let second = set_status(&mut view, &mut writes, AssetStatus::ChangesRequested);

        assert!(second.revert(&mut view, &mut writes));
        assert_eq!(status(&view), AssetStatus::Approved);
        assert!(first.revert(&mut view, &mut writes));
        assert_eq!(status(&view), AssetStatus::InReview);
    }

    #[test]
    fn failures_in_issue_order_restore_the_original() {
        let mut view = view_with_status(AssetStatus::InReview);
        let mut writes = WriteLog::default();

        let first = set_status(&mut view, &mut writes, AssetStatus::Approved);
        let second = set_status(&mut view, &mut writes, AssetStatus::ChangesRequested);

        assert!(!first.revert(&mut view, &mut writes));
        assert_eq!(status(&view), AssetStatus::ChangesRequested);
        assert!(second.revert(&mut view, &mut writes));
        assert_eq!(status(&view), AssetStatus::InReview);
    }

    #[test]
    fn newer_failure_falls_back_to_confirmed_older_value() {
        let mut view = view_with_status(AssetStatus::InReview);
        let mut writes = WriteLog::default();

        let first = set_status(&mut view, &mut writes, AssetStatus::Approved);
        let second = set_status(&mut view, &mut writes, AssetStatus::ChangesRequested);

        first.settle(&mut writes);
        assert!(second.revert(&mut view, &mut writes));
        assert_eq!(status(&view), AssetStatus::Approved);
    }

    #[test]
    fn pending_tracks_unconfirmed_writes() {
        let mut view = view_with_status(AssetStatus::InReview);
        let mut writes = WriteLog::default();
        assert!(!writes.is_pending(Field::Status));

        let first = set_status(&mut view, &mut writes, AssetStatus::Approved);
        let second = set_status(&mut view, &mut writes, AssetStatus::Approved);
        assert!(writes.is_pending(Field::Status));

        assert!(!first.revert(&mut view, &mut writes));
        assert!(writes.is_pending(Field::Status));
        second.settle(&mut writes);
        assert!(!writes.is_pending(Field::Status));
        assert_eq!(status(&view), AssetStatus::Approved);
    }

    #[test]
    fn settled_write_is_not_reverted_later() {
        let mut view = view_with_status(AssetStatus::InReview);
        let mut writes = WriteLog::default();

        let t = set_status(&mut view, &mut writes, AssetStatus::Approved);
        t.settle(&mut writes);
        assert!(!t.revert(&mut view, &mut writes));
        assert_eq!(status(&view), AssetStatus::Approved);
    }

    #[test]
    fn rollback_for_replaced_asset_is_dropped() {
        let mut view = view_with_status(AssetStatus::InReview);
        let mut writes = WriteLog::default();

        let t = set_status(&mut view, &mut writes, AssetStatus::Approved);
        view = view_with_status(AssetStatus::Approved);
        assert!(!t.revert(&mut view, &mut writes));
        assert_eq!(status(&view), AssetStatus::Approved);
    }

    #[test]
    fn cleared_log_drops_pending_restores() {
        let mut view = view_with_status(AssetStatus::InReview);
        let mut writes = WriteLog::default();

        let t = set_status(&mut view, &mut writes, AssetStatus::Approved);
        writes.clear();
        assert!(!t.revert(&mut view, &mut writes));
        assert_eq!(status(&view), AssetStatus::Approved);
    }

    #[test]
    fn removing_a_missing_thread_is_a_no_op() {
        let mut view = view_with_status(AssetStatus::InReview);
        let mut writes = WriteLog::default();
        let asset_id = view.asset.as_ref().unwrap().id;

        let t = Tentative::new(
            asset_id,
            Rollback::RemoveThread {
                thread_id: reelnote_core::types::new_id(),
            },
        );
        assert!(!t.revert(&mut view, &mut writes));
    }
}
