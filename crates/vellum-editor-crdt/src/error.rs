//! Error types for document store operations.

use miette::Diagnostic;
use thiserror::Error;

/// Errors returned by [`DocumentStore`](crate::DocumentStore).
///
/// Edits never fail: out-of-range offsets are clamped. Only snapshot
/// import/export can report an error, and a failed import leaves the store
/// exactly as it was, so the caller may retry with other bytes.
#[derive(Error, Debug, Diagnostic)]
#[non_exhaustive]
pub enum StoreError {
    /// Import bytes are not a snapshot this store can read.
    #[error("corrupt snapshot: {reason}")]
    #[diagnostic(
        code(vellum::store::corrupt_snapshot),
        help("snapshots must come from `export_snapshot` and arrive unmodified")
    )]
    CorruptSnapshot { reason: String },

    /// Envelope is intact but written by a newer format.
    #[error("unsupported snapshot format version {found} (this build reads {supported})")]
    #[diagnostic(code(vellum::store::unsupported_version))]
    UnsupportedSnapshotVersion { found: u8, supported: u8 },

    /// Failed to export CRDT data.
    #[error("failed to export document: {0}")]
    #[diagnostic(code(vellum::store::export))]
    Export(String),

    /// Loro CRDT error.
    #[error("loro error: {0}")]
    #[diagnostic(code(vellum::store::loro))]
    Loro(String),
}

impl StoreError {
    pub fn corrupt(reason: impl Into<String>) -> Self {
        StoreError::CorruptSnapshot {
            reason: reason.into(),
        }
    }

    pub fn is_corrupt(&self) -> bool {
        matches!(self, StoreError::CorruptSnapshot { .. })
    }
}

impl From<loro::LoroError> for StoreError {
    fn from(e: loro::LoroError) -> Self {
        StoreError::Loro(e.to_string())
    }
}
