//! vellum-common: shared plumbing for the vellum editor crates.
//!
//! - `error`: application-boundary error type with miette diagnostics
//! - `perf`: timing helpers used by the benchmark CLI and hot paths
//! - `telemetry`: tracing subscriber setup (behind the `telemetry` feature)

pub mod error;
pub mod perf;
#[cfg(feature = "telemetry")]
pub mod telemetry;

pub use error::{ConfigError, VellumError};
