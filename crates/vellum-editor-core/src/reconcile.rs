//! View/model reconciliation.
//!
//! The reconciler sits between the live view and the canonical store. Store
//! changes are written into the view; view mutations are written into the
//! store. The hard part is that writing the view produces a mutation of its
//! own, which must not be mistaken for user input and written straight back.
//!
//! ```text
//!   Idle ──RemoteContentChanged(differs)──▶ ApplyingRemoteUpdate
//!    ▲                                          │ microtasks drained
//!    └──────────────────────────────────────────┘
//!   Idle ──LocalEditObserved──▶ CapturingLocalEdit ──forwarded──▶ Idle
//! ```
//!
//! While applying, the suppression flag is set and programmatic mutations
//! (the view's echo of the write) are dropped. Mutations tagged
//! [`MutationSource::User`] are always forwarded: they are real input, even
//! inside the window. The flag is cleared by a [`Microtask::ClearSuppression`]
//! scheduled alongside the write, so it never outlives the current task.
//!
//! Hosts must feed pending view mutations before the next
//! `RemoteContentChanged`, so a local edit is observed before the remote
//! change that follows it. A user edit made on top of store changes the view
//! has not shown yet is rebased over them rather than overwriting them.

use serde::Serialize;

use crate::tasks::{Microtask, TaskQueue};
use crate::text::{ContentStore, TextEdit};
use crate::view::{EditableView, MutationRecord, MutationSource};

/// Events fed to the reconciler by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    /// The view changed; the record carries its content after the change.
    LocalEditObserved(MutationRecord),
    /// The store changed; carries the store's new content.
    RemoteContentChanged(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum ReconcileState {
    #[default]
    Idle,
    ApplyingRemoteUpdate,
    CapturingLocalEdit,
}

/// What the reconciler did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    /// Content already matched; nothing written.
    Unchanged,
    /// Store content was written into the view.
    ViewUpdated,
    /// A local edit was written into the store.
    StoreUpdated,
    /// A mutation arrived inside the suppression window and was dropped.
    Suppressed,
    /// The view rejected the write; it keeps its previous content.
    Failed,
}

/// Running counters, mostly for tests and the benchmark report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    pub remote_applied: usize,
    pub local_forwarded: usize,
    pub echoes_suppressed: usize,
    pub carets_restored: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    state: ReconcileState,
    suppressed: bool,
    stats: ReconcileStats,
    /// Content the view was last known to show.
    last_view: Option<String>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ReconcileState {
        self.state
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    pub fn stats(&self) -> ReconcileStats {
        self.stats
    }

    pub fn handle<V, S>(
        &mut self,
        event: ViewEvent,
        view: &mut V,
        store: &mut S,
        tasks: &mut TaskQueue,
    ) -> Reaction
    where
        V: EditableView + ?Sized,
        S: ContentStore + ?Sized,
    {
        match event {
            ViewEvent::RemoteContentChanged(content) => self.apply_remote(&content, view, tasks),
            ViewEvent::LocalEditObserved(record) => self.capture_local(record, store),
        }
    }

    fn apply_remote<V>(&mut self, content: &str, view: &mut V, tasks: &mut TaskQueue) -> Reaction
    where
        V: EditableView + ?Sized,
    {
        let current = view.content();
        if current == content {
            self.last_view = Some(current);
            return Reaction::Unchanged;
        }

        let saved_offset = view.caret_offset();
        let previous_text = view.text_content();

        self.suppressed = true;
        self.state = ReconcileState::ApplyingRemoteUpdate;

        if let Err(err) = view.replace_content(content) {
            tracing::warn!(
                target: "vellum::reconcile",
                error = %err,
                "view rejected remote content, keeping previous rendering"
            );
            self.suppressed = false;
            self.state = ReconcileState::Idle;
            return Reaction::Failed;
        }
        self.last_view = Some(view.content());

        match saved_offset {
            Some(saved_offset) => tasks.schedule(Microtask::RestoreCaret {
                saved_offset,
                previous_text,
            }),
            None => tracing::trace!(
                target: "vellum::reconcile",
                "no caret before remote update, skipping restoration"
            ),
        }
        tasks.schedule_once(Microtask::ClearSuppression);

        self.stats.remote_applied += 1;
        tracing::debug!(
            target: "vellum::reconcile",
            len = content.len(),
            "applied remote content to view"
        );
        Reaction::ViewUpdated
    }

    fn capture_local<S>(&mut self, record: MutationRecord, store: &mut S) -> Reaction
    where
        S: ContentStore + ?Sized,
    {
        let base = self.last_view.replace(record.content.clone());

        let in_window = self.suppressed || self.state == ReconcileState::ApplyingRemoteUpdate;
        if in_window && record.source == MutationSource::Programmatic {
            self.stats.echoes_suppressed += 1;
            tracing::trace!(target: "vellum::reconcile", "suppressed view mutation echo");
            return Reaction::Suppressed;
        }

        let resume = self.state;
        self.state = ReconcileState::CapturingLocalEdit;

        let current = store.content();
        let target = match base {
            // The store moved since the view last matched it; keep both edits.
            Some(base) if base != current => {
                tracing::debug!(
                    target: "vellum::reconcile",
                    in_window,
                    "rebasing local edit over unseen store changes"
                );
                rebase(&base, &record.content, &current)
            }
            _ => record.content,
        };

        let reaction = if current != target && store.set_content(&target) {
            self.stats.local_forwarded += 1;
            Reaction::StoreUpdated
        } else {
            Reaction::Unchanged
        };
        // A user edit inside the window leaves the pending update's state alone.
        self.state = if in_window { resume } else { ReconcileState::Idle };
        reaction
    }

    /// Run one deferred task. Returns false for tasks the reconciler does not
    /// own, which the caller must handle itself.
    pub fn run_microtask<V>(&mut self, task: &Microtask, view: &mut V) -> bool
    where
        V: EditableView + ?Sized,
    {
        match task {
            Microtask::RestoreCaret {
                saved_offset,
                previous_text,
            } => {
                self.restore_caret(*saved_offset, previous_text, view);
                true
            }
            Microtask::ClearSuppression => {
                self.suppressed = false;
                self.state = ReconcileState::Idle;
                true
            }
            Microtask::Rewindow => false,
        }
    }

    fn restore_caret<V>(&mut self, saved_offset: usize, previous_text: &str, view: &mut V)
    where
        V: EditableView + ?Sized,
    {
        let current_text = view.text_content();
        let target = match TextEdit::between(previous_text, &current_text) {
            Some(edit) => edit.transform_offset(saved_offset),
            None => saved_offset,
        };

        match view.place_caret(target) {
            Ok(()) => {
                self.stats.carets_restored += 1;
                tracing::trace!(
                    target: "vellum::reconcile",
                    saved_offset,
                    restored = target,
                    "restored caret"
                );
            }
            Err(err) => tracing::warn!(
                target: "vellum::reconcile",
                error = %err,
                saved_offset,
                "caret restoration skipped"
            ),
        }
    }

    /// Drain every reconciler-owned task from `tasks`, handing back the rest
    /// in order.
    pub fn drain<V>(&mut self, tasks: &mut TaskQueue, view: &mut V) -> Vec<Microtask>
    where
        V: EditableView + ?Sized,
    {
        let mut unhandled = Vec::new();
        while let Some(task) = tasks.pop() {
            if !self.run_microtask(&task, view) {
                unhandled.push(task);
            }
        }
        unhandled
    }
}

/// Replay the edit that turned `base` into `edited` on top of `moved`, a
/// concurrent revision of `base`.
///
/// Positions are mapped through the concurrent edit; at equal positions the
/// local insert goes first.
fn rebase(base: &str, edited: &str, moved: &str) -> String {
    let Some(local) = TextEdit::between(base, edited) else {
        return moved.to_string();
    };
    let Some(remote) = TextEdit::between(base, moved) else {
        return edited.to_string();
    };
    let start = remote.transform_offset(local.start);
    let end = remote
        .transform_offset(local.start + local.deleted)
        .max(start);
    TextEdit {
        start,
        deleted: end - start,
        inserted: local.inserted,
    }
    .apply(moved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::ViewTree;

    /// Plain string store that counts writes.
    #[derive(Debug, Default)]
    struct MemoryStore {
        content: String,
        writes: usize,
    }

    impl ContentStore for MemoryStore {
        fn content(&self) -> String {
            self.content.clone()
        }

        fn set_content(&mut self, content: &str) -> bool {
            if self.content == content {
                return false;
            }
            self.content = content.to_string();
            self.writes += 1;
            true
        }
    }

    struct Harness {
        reconciler: Reconciler,
        view: ViewTree,
        store: MemoryStore,
        tasks: TaskQueue,
    }

    impl Harness {
        fn new(content: &str) -> Self {
            Self {
                reconciler: Reconciler::new(),
                view: ViewTree::with_content(content).unwrap(),
                store: MemoryStore {
                    content: content.to_string(),
                    writes: 0,
                },
                tasks: TaskQueue::new(),
            }
        }

        fn send(&mut self, event: ViewEvent) -> Reaction {
            self.reconciler
                .handle(event, &mut self.view, &mut self.store, &mut self.tasks)
        }

        /// Feed recorded view mutations back, as a mutation observer would.
        fn pump_view(&mut self) -> Vec<Reaction> {
            self.view
                .take_mutations()
                .into_iter()
                .map(|m| self.send(ViewEvent::LocalEditObserved(m)))
                .collect()
        }

        fn remote(&mut self, content: &str) -> Reaction {
            self.store.set_content(content);
            self.send(ViewEvent::RemoteContentChanged(content.to_string()))
        }

        fn drain(&mut self) {
            let rest = self.reconciler.drain(&mut self.tasks, &mut self.view);
            assert!(rest.is_empty());
        }
    }

    #[test]
    fn test_remote_update_suppresses_echo() {
        let mut h = Harness::new("<p>x</p>");
        assert_eq!(h.remote("<p>a</p>"), Reaction::ViewUpdated);
        assert_eq!(h.reconciler.state(), ReconcileState::ApplyingRemoteUpdate);
        assert!(h.reconciler.is_suppressed());

        // The view's own write comes back as a mutation and is dropped.
        assert_eq!(h.pump_view(), vec![Reaction::Suppressed]);
        assert_eq!(h.reconciler.stats().local_forwarded, 0);

        h.drain();
        assert_eq!(h.reconciler.state(), ReconcileState::Idle);
        assert!(!h.reconciler.is_suppressed());
        assert_eq!(h.view.content(), "<p>a</p>");
        assert_eq!(h.store.content(), "<p>a</p>");
    }

    #[test]
    fn test_identical_remote_content_is_ignored() {
        let mut h = Harness::new("<p>same</p>");
        assert_eq!(h.remote("<p>same</p>"), Reaction::Unchanged);
        assert!(h.tasks.is_empty());
        assert!(!h.view.has_pending_mutations());
        assert_eq!(h.reconciler.state(), ReconcileState::Idle);
    }

    #[test]
    fn test_local_edit_reaches_store() {
        let mut h = Harness::new("<p>helo</p>");
        h.view.place_caret(3).unwrap();
        h.view.type_text("l").unwrap();
        assert_eq!(h.pump_view(), vec![Reaction::StoreUpdated]);
        assert_eq!(h.store.content(), "<p>hello</p>");
        assert_eq!(h.reconciler.state(), ReconcileState::Idle);
    }

    #[test]
    fn test_local_edit_matching_store_is_not_rewritten() {
        let mut h = Harness::new("<p>a</p>");
        let reaction = h.send(ViewEvent::LocalEditObserved(MutationRecord {
            source: MutationSource::User,
            content: "<p>a</p>".into(),
        }));
        assert_eq!(reaction, Reaction::Unchanged);
        assert_eq!(h.store.writes, 0);
    }

    #[test]
    fn test_user_edit_inside_window_is_captured() {
        let mut h = Harness::new("<p>ab</p>");
        h.view.place_caret(2).unwrap();
        h.remote("<p>abc</p>");
        // Typed before the clear task ran.
        h.view.place_caret(2).unwrap();
        h.view.type_text("!").unwrap();

        assert_eq!(
            h.pump_view(),
            vec![Reaction::Suppressed, Reaction::StoreUpdated]
        );
        assert_eq!(h.store.content(), "<p>ab!c</p>");
        assert_eq!(h.reconciler.state(), ReconcileState::ApplyingRemoteUpdate);
        assert_eq!(h.reconciler.stats().echoes_suppressed, 1);

        h.drain();
        assert_eq!(h.reconciler.state(), ReconcileState::Idle);
        assert_eq!(h.view.content(), h.store.content());
    }

    #[test]
    fn test_user_edit_is_rebased_over_unseen_store_change() {
        let mut h = Harness::new("<p>shared</p>");
        // Seed what the view is known to show.
        assert_eq!(h.remote("<p>shared</p>"), Reaction::Unchanged);

        h.view.place_caret(0).unwrap();
        h.view.type_text("X").unwrap();
        // A remote change lands in the store before the edit is observed.
        h.store.set_content("<p>R shared</p>");

        assert_eq!(h.pump_view(), vec![Reaction::StoreUpdated]);
        assert_eq!(h.store.content(), "<p>XR shared</p>");
        assert_eq!(h.reconciler.stats().local_forwarded, 1);

        // The view then catches up with the merged content.
        let merged = h.store.content();
        assert_eq!(h.send(ViewEvent::RemoteContentChanged(merged)), Reaction::ViewUpdated);
        assert_eq!(h.pump_view(), vec![Reaction::Suppressed]);
        h.drain();
        assert_eq!(h.view.content(), "<p>XR shared</p>");
        assert_eq!(h.view.caret_offset(), Some(1));
    }

    #[test]
    fn test_rebase_maps_edit_through_concurrent_change() {
        // Local insert after a remote insert.
        assert_eq!(rebase("abcd", "abcXd", "Rabcd"), "RabcXd");
        // Local delete ahead of a remote append.
        assert_eq!(rebase("abcd", "ad", "abcdR"), "adR");
        // No local change leaves the store alone.
        assert_eq!(rebase("abcd", "abcd", "abcdR"), "abcdR");
    }

    #[test]
    fn test_input_after_drain_is_captured() {
        let mut h = Harness::new("<p>ab</p>");
        h.view.place_caret(2).unwrap();
        h.remote("<p>abc</p>");
        h.pump_view();
        h.drain();

        h.view.type_text("!").unwrap();
        assert_eq!(h.pump_view(), vec![Reaction::StoreUpdated]);
        assert_eq!(h.store.content(), "<p>ab!c</p>");
    }

    #[test]
    fn test_caret_kept_when_insert_after_it() {
        let mut h = Harness::new("<p>hello world</p>");
        h.view.place_caret(5).unwrap();
        h.remote("<p>hello world, again</p>");
        h.drain();
        assert_eq!(h.view.caret_offset(), Some(5));

        // Insert exactly at the caret also keeps it.
        h.remote("<p>hello, world, again</p>");
        h.drain();
        assert_eq!(h.view.caret_offset(), Some(5));
    }

    #[test]
    fn test_caret_shifted_by_insert_before_it() {
        let mut h = Harness::new("<p>hello world</p>");
        h.view.place_caret(5).unwrap();
        h.remote("<h1>Oh</h1><p>hello world</p>");
        h.drain();
        assert_eq!(h.view.caret_offset(), Some(7));
    }

    #[test]
    fn test_caret_collapses_into_deleted_span() {
        let mut h = Harness::new("<p>hello world</p>");
        h.view.place_caret(8).unwrap();
        h.remote("<p>held</p>");
        h.drain();
        assert_eq!(h.view.caret_offset(), Some(3));
    }

    #[test]
    fn test_no_caret_means_no_restoration() {
        let mut h = Harness::new("<p>a</p>");
        h.remote("<p>b</p>");
        assert_eq!(h.tasks.len(), 1);
        h.drain();
        assert_eq!(h.view.caret_offset(), None);
        assert_eq!(h.reconciler.stats().carets_restored, 0);
    }

    #[test]
    fn test_back_to_back_remote_updates_share_one_clear() {
        let mut h = Harness::new("<p>abc</p>");
        h.view.place_caret(3).unwrap();
        h.remote("<p>Xabc</p>");
        h.remote("<p>XYabc</p>");
        let echoes = h.pump_view();
        assert_eq!(echoes, vec![Reaction::Suppressed, Reaction::Suppressed]);
        // One caret restore from the first update, one clear.
        assert_eq!(h.tasks.len(), 2);
        h.drain();
        assert_eq!(h.view.caret_offset(), Some(5));
        assert!(!h.reconciler.is_suppressed());
    }

    #[test]
    fn test_programmatic_records_are_tagged() {
        let mut h = Harness::new("<p>a</p>");
        h.remote("<p>b</p>");
        let records = h.view.take_mutations();
        assert_eq!(records[0].source, MutationSource::Programmatic);
    }

    #[test]
    fn test_rewindow_is_left_to_caller() {
        let mut h = Harness::new("<p>a</p>");
        h.tasks.schedule(Microtask::Rewindow);
        let rest = h.reconciler.drain(&mut h.tasks, &mut h.view);
        assert_eq!(rest, vec![Microtask::Rewindow]);
    }
}
