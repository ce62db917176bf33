use miette::Diagnostic;
use thiserror::Error;
use vellum_editor_core::ViewError;
use vellum_editor_crdt::StoreError;

/// Errors surfaced by [`EditorSession`](crate::EditorSession).
#[derive(Error, Debug, Diagnostic)]
pub enum SessionError {
    #[error(transparent)]
    #[diagnostic(code(vellum::session::view))]
    View(#[from] ViewError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),
}
