//! One editing session: store, blocks, window, view and the reconciler
//! between them.
//!
//! Nothing here is global. A host constructs an `EditorSession`, feeds it
//! input, and calls [`pump`](EditorSession::pump) and
//! [`run_microtasks`](EditorSession::run_microtasks) from its event loop.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use vellum_editor_core::suggest::MAX_QUERY_CHARS;
use vellum_editor_core::{
    Block, BlockCache, CommandRequest, DocumentStats, EditableView, EditorCommand, Microtask,
    Reaction, ReconcileState, Reconciler, RenderPlan, TaskQueue, Trigger, ViewEvent, ViewTree,
    VirtualItem, Virtualizer, detect_trigger,
};
use vellum_editor_crdt::{DocumentStore, ImportOutcome, StoreChange, StoreError};

use crate::{EditorConfig, SessionError};

/// Upper bound on pump rounds; each round can only produce echoes.
const MAX_PUMP_ROUNDS: usize = 8;

/// What one [`EditorSession::pump`] call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpReport {
    pub store_changes: usize,
    pub view_mutations: usize,
    pub store_writes: usize,
    pub suppressed: usize,
}

/// A block scheduled for rendering, with its position.
#[derive(Debug, Clone)]
pub struct RenderedBlock {
    pub item: VirtualItem,
    pub block: Block,
}

pub struct EditorSession {
    config: EditorConfig,
    store: DocumentStore,
    view: ViewTree,
    blocks: BlockCache,
    virtualizer: Virtualizer,
    reconciler: Reconciler,
    tasks: TaskQueue,
    inbox: Rc<RefCell<VecDeque<StoreChange>>>,
}

impl EditorSession {
    /// A session over an empty document.
    pub fn new(config: EditorConfig) -> Self {
        Self::with_store(config, DocumentStore::new())
    }

    /// A session restored from an exported snapshot.
    pub fn from_snapshot(config: EditorConfig, bytes: &[u8]) -> Result<Self, SessionError> {
        let store = DocumentStore::from_snapshot(bytes)?;
        Ok(Self::with_store(config, store))
    }

    /// A session over an existing store. The view starts out showing the
    /// store's current content.
    pub fn with_store(config: EditorConfig, mut store: DocumentStore) -> Self {
        let inbox: Rc<RefCell<VecDeque<StoreChange>>> = Rc::default();
        let sink = Rc::clone(&inbox);
        store.subscribe(move |change| sink.borrow_mut().push_back(change.clone()));

        let mut virtualizer = Virtualizer::new(config.virtualizer_options(0));
        virtualizer.set_viewport_size(config.virtualization.viewport_height);

        let mut session = Self {
            config,
            store,
            view: ViewTree::new(),
            blocks: BlockCache::new(),
            virtualizer,
            reconciler: Reconciler::new(),
            tasks: TaskQueue::new(),
            inbox,
        };

        let content = session.store.content();
        if !content.is_empty() {
            session
                .inbox
                .borrow_mut()
                .push_back(initial_change(&session.store, content));
        }
        session.refresh_blocks();
        session.tick();
        session
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// Direct store access, e.g. for a collaboration layer. Changes made here
    /// reach the view on the next pump.
    pub fn store_mut(&mut self) -> &mut DocumentStore {
        &mut self.store
    }

    pub fn view(&self) -> &ViewTree {
        &self.view
    }

    /// Direct view access for typing and caret movement. Mutations are
    /// captured on the next pump.
    pub fn view_mut(&mut self) -> &mut ViewTree {
        &mut self.view
    }

    pub fn reconcile_state(&self) -> ReconcileState {
        self.reconciler.state()
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn pending_microtasks(&self) -> usize {
        self.tasks.len()
    }

    /// Canonical content.
    pub fn content(&self) -> String {
        self.store.content()
    }

    /// Replace the canonical content, as a programmatic caller would.
    ///
    /// Pending view edits are captured first, so they are observed before
    /// the replacement.
    pub fn set_content(&mut self, content: &str) -> bool {
        self.pump();
        self.store.set_content(content)
    }

    pub fn export_snapshot(&self) -> Result<Vec<u8>, StoreError> {
        self.store.export_snapshot()
    }

    /// Merge a remote snapshot.
    ///
    /// Pending view edits are written to the store before the import, so a
    /// local edit is never overtaken by the remote change.
    pub fn import_snapshot(&mut self, bytes: &[u8]) -> Result<ImportOutcome, StoreError> {
        self.pump();
        self.store.import_snapshot(bytes)
    }

    /// Deliver pending view mutations to the store and pending store changes
    /// to the view, until neither side has anything left.
    ///
    /// Mutations go first in each round: an edit already made in the view is
    /// observed before any store change that is still queued.
    pub fn pump(&mut self) -> PumpReport {
        let mut report = PumpReport::default();
        for _ in 0..MAX_PUMP_ROUNDS {
            let mutations = self.view.take_mutations();
            let observed = mutations.len();
            for mutation in mutations {
                report.view_mutations += 1;
                match self.dispatch(ViewEvent::LocalEditObserved(mutation)) {
                    Reaction::StoreUpdated => report.store_writes += 1,
                    Reaction::Suppressed => report.suppressed += 1,
                    _ => {}
                }
            }

            // Only the newest content matters; earlier notifications are stale.
            let changes: Vec<StoreChange> = self.inbox.borrow_mut().drain(..).collect();
            if changes.is_empty() && observed == 0 {
                break;
            }
            report.store_changes += changes.len();
            if let Some(latest) = changes.into_iter().last() {
                self.tasks.schedule_once(Microtask::Rewindow);
                self.dispatch(ViewEvent::RemoteContentChanged(latest.content));
            }
        }
        report
    }

    fn dispatch(&mut self, event: ViewEvent) -> Reaction {
        self.reconciler
            .handle(event, &mut self.view, &mut self.store, &mut self.tasks)
    }

    /// Drain deferred work: caret restoration, suppression clear, window
    /// recomputation.
    pub fn run_microtasks(&mut self) {
        for task in self.reconciler.drain(&mut self.tasks, &mut self.view) {
            match task {
                Microtask::Rewindow => self.refresh_blocks(),
                other => tracing::warn!(target: "vellum::session", ?other, "unhandled microtask"),
            }
        }
    }

    /// Pump, then drain microtasks: one full turn of the host event loop.
    pub fn tick(&mut self) -> PumpReport {
        let report = self.pump();
        self.run_microtasks();
        report
    }

    fn refresh_blocks(&mut self) {
        let content = self.store.content();
        let count = self.blocks.blocks_for(&content).len();
        self.virtualizer.set_count(count);
    }

    /// Current blocks, from the last refresh.
    pub fn blocks(&self) -> &[Block] {
        self.blocks.blocks()
    }

    pub fn render_plan(&mut self) -> RenderPlan {
        self.virtualizer.plan()
    }

    /// Blocks to render right now, with positions. With virtualization off,
    /// every block is returned, laid out on the same size model.
    pub fn rendered_blocks(&mut self) -> Vec<RenderedBlock> {
        let plan = self.virtualizer.plan();
        let blocks = self.blocks.blocks();
        match plan {
            RenderPlan::Windowed { items, .. } => items
                .into_iter()
                .filter_map(|item| {
                    let block = blocks.get(item.index)?.clone();
                    Some(RenderedBlock { item, block })
                })
                .collect(),
            RenderPlan::Full { count } => {
                let mut start = 0.0;
                (0..count)
                    .filter_map(|index| {
                        let block = blocks.get(index)?.clone();
                        let size = self.virtualizer.size_of(index);
                        let item = VirtualItem {
                            index,
                            start,
                            end: start + size,
                            size,
                            key: block.id.clone(),
                        };
                        start += size;
                        Some(RenderedBlock { item, block })
                    })
                    .collect()
            }
        }
    }

    pub fn total_size(&mut self) -> f64 {
        self.virtualizer.total_size()
    }

    pub fn scroll_to(&mut self, offset: f64) {
        self.virtualizer.set_scroll_offset(offset);
    }

    pub fn scroll_offset(&self) -> f64 {
        self.virtualizer.scroll_offset()
    }

    pub fn resize_viewport(&mut self, height: f64) {
        self.virtualizer.set_viewport_size(height);
    }

    /// Report a rendered block's real height. Returns the scroll adjustment
    /// the host should apply.
    pub fn measure_block(&mut self, index: usize, height: f64) -> f64 {
        self.virtualizer.measure(index, height)
    }

    pub fn set_virtualization(&mut self, enabled: bool) {
        self.virtualizer.set_enabled(enabled);
    }

    /// Apply a toolbar command to the focused region.
    ///
    /// Undo and redo go to the store. Everything else is applied by the view
    /// and captured like any other edit. Ends with a full [`tick`](Self::tick),
    /// so the view is editable again when this returns.
    pub fn apply_command(
        &mut self,
        command: EditorCommand,
        value: Option<&str>,
    ) -> Result<(), SessionError> {
        match command {
            EditorCommand::Undo => {
                self.store.undo();
            }
            EditorCommand::Redo => {
                self.store.redo();
            }
            _ => self.view.exec_command(command, value)?,
        }
        self.tick();
        Ok(())
    }

    /// [`apply_command`](Self::apply_command) for a toolbar request as sent over
    /// the wire.
    pub fn apply_request(&mut self, request: &CommandRequest) -> Result<(), SessionError> {
        self.apply_command(request.command, request.value.as_deref())
    }

    /// Text before the caret, at most `max_chars` long. Empty without a caret.
    pub fn preceding_text(&self, max_chars: usize) -> String {
        let Some(caret) = self.view.caret_offset() else {
            return String::new();
        };
        let text: Vec<char> = self.view.text_content().chars().take(caret).collect();
        let from = text.len().saturating_sub(max_chars);
        text[from..].iter().collect()
    }

    /// Mention or slash-command trigger immediately before the caret.
    pub fn active_trigger(&self) -> Option<Trigger> {
        detect_trigger(
            &self.preceding_text(MAX_QUERY_CHARS + 2),
            &self.config.suggestion_triggers,
        )
    }

    /// Replace the active trigger and its query with `replacement`.
    ///
    /// The splice goes through the view and is captured like typing. Returns
    /// false when no trigger is active.
    pub fn accept_suggestion(&mut self, replacement: &str) -> Result<bool, SessionError> {
        let (Some(trigger), Some(caret)) = (self.active_trigger(), self.view.caret_offset()) else {
            return Ok(false);
        };
        let start = caret - trigger.span_len;
        self.view.splice_text(start, trigger.span_len, replacement)?;
        self.tick();
        Ok(true)
    }

    /// Read-only statistics over the current blocks.
    pub fn stats(&mut self) -> DocumentStats {
        let content = self.store.content();
        DocumentStats::from_blocks(self.blocks.blocks_for(&content))
    }
}

fn initial_change(store: &DocumentStore, content: String) -> StoreChange {
    StoreChange {
        content,
        origin: vellum_editor_crdt::ChangeOrigin::Import,
        version: store.version(),
        seq: 0,
    }
}
