//! vellum-editor: the editing session.
//!
//! [`EditorSession`] owns one document's store, view, block cache and
//! virtualizer, and routes changes between them through the reconciler.
//! Configuration is read from KDL; see [`config`].

pub mod config;
mod error;
pub mod session;

pub use config::{EditorConfig, VirtualizationConfig};
pub use error::SessionError;
pub use session::{EditorSession, PumpReport, RenderedBlock};

pub use vellum_editor_core::{EditorCommand, RenderPlan, Trigger};
