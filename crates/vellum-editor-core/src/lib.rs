//! vellum-editor-core: pure editor logic without framework or CRDT dependencies.
//!
//! This crate provides:
//! - `HtmlTree` - lenient, arena-indexed HTML parsing
//! - Block segmentation and the `BlockCache`
//! - `Virtualizer` - viewport windowing over variable-height blocks
//! - `EditableView` trait and the in-memory `ViewTree`
//! - `Reconciler` - echo-suppressing view/store synchronization with caret preservation
//! - `ContentStore` trait and text diffing
//! - Toolbar commands, suggestion triggers, document stats

pub mod actions;
pub mod cursor;
pub mod html;
pub mod reconcile;
pub mod segment;
pub mod stats;
pub mod suggest;
pub mod tasks;
pub mod text;
pub mod view;
pub mod virtualizer;

pub use actions::{CommandRequest, EditorCommand, UnknownCommand};
pub use cursor::CaretPosition;
pub use html::{HtmlTree, NodeData, NodeId, ParseFault};
pub use reconcile::{Reaction, ReconcileState, ReconcileStats, Reconciler, ViewEvent};
pub use segment::{Block, BlockCache, BlockKind, NodeClass, classify, hash_source, segment};
pub use smol_str::SmolStr;
pub use stats::DocumentStats;
pub use suggest::{DEFAULT_TRIGGERS, Trigger, detect_trigger};
pub use tasks::{Microtask, TaskQueue};
pub use text::{ContentStore, TextEdit};
pub use view::{EditableView, MutationRecord, MutationSource, ViewError, ViewTree};
pub use virtualizer::{Align, RenderPlan, VirtualItem, Virtualizer, VirtualizerOptions, WindowRange};
