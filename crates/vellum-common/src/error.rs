//! Error types for vellum at the application boundary.
//!
//! Library crates keep their own `thiserror` enums; this type is where they
//! meet the CLI and configuration loading, so it carries miette diagnostics.

use miette::{Diagnostic, NamedSource, SourceOffset, SourceSpan};

/// Main error type for vellum operations
#[derive(thiserror::Error, Debug, Diagnostic)]
pub enum VellumError {
    /// IO error
    #[error(transparent)]
    #[diagnostic(code(vellum::io))]
    Io(#[from] std::io::Error),

    /// Configuration could not be parsed
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    /// Snapshot bytes were rejected by the document store
    #[error("snapshot rejected: {0}")]
    #[diagnostic(
        code(vellum::snapshot),
        help("the file must be produced by `vellum snapshot export`")
    )]
    Snapshot(String),

    /// A command-line argument was out of range or malformed
    #[error("invalid argument: {0}")]
    #[diagnostic(code(vellum::argument))]
    InvalidArgument(String),
}

/// Configuration error with source code location information
#[derive(thiserror::Error, Debug, Diagnostic)]
#[error("config error: {message}")]
#[diagnostic(code(vellum::config))]
pub struct ConfigError {
    message: String,
    #[source_code]
    src: NamedSource<String>,
    #[label("here")]
    err_location: SourceSpan,
    #[help]
    advice: Option<String>,
}

impl ConfigError {
    /// Build an error pointing at `offset..offset+len` in the config source.
    pub fn new(
        name: impl AsRef<str>,
        source: impl Into<String>,
        message: impl Into<String>,
        offset: usize,
        len: usize,
    ) -> Self {
        let source = source.into();
        let offset = offset.min(source.len());
        Self {
            message: message.into(),
            err_location: SourceSpan::new(SourceOffset::from(offset), len),
            src: NamedSource::new(name, source),
            advice: None,
        }
    }

    /// Attach a help line shown under the diagnostic.
    pub fn with_advice(mut self, advice: impl Into<String>) -> Self {
        self.advice = Some(advice.into());
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Byte offset of the offending span in the config source.
    pub fn offset(&self) -> usize {
        self.err_location.offset()
    }
}
