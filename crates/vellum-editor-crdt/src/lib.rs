//! Replicated document store backed by Loro.
//!
//! This crate provides:
//! - `DocumentStore`: the canonical document as a Loro text container, with
//!   prefix/suffix-diffed replacement, clamped edits, undo/redo and change
//!   subscriptions
//! - A versioned snapshot envelope (`VLM1`) for export/import
//! - `StoreError` for the few operations that can fail

mod error;
mod store;

pub use error::StoreError;
pub use store::{
    ChangeOrigin, DocumentStore, ImportOutcome, SNAPSHOT_MAGIC, SNAPSHOT_VERSION, StoreChange,
    SubscriptionId,
};

// Re-export Loro types that consumers need
pub use loro::VersionVector;
