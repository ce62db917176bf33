//! Tracing setup for vellum binaries.
//!
//! ```ignore
//! use vellum_common::telemetry::{self, TelemetryConfig};
//!
//! telemetry::init(TelemetryConfig::from_env("vellum-cli"));
//! tracing::info!(target: "vellum::store", "ready");
//! ```
//!
//! Editor crates log under `vellum::*` targets (`vellum::store`,
//! `vellum::segment`, `vellum::window`, `vellum::reconcile`, `vellum::perf`),
//! so `RUST_LOG=vellum::reconcile=trace` narrows output to one subsystem.

use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Reported once at startup.
    pub service_name: String,
    /// Used when `RUST_LOG` is unset. INFO, or DEBUG in debug builds.
    pub console_level: Level,
    /// Log span close events with their duration (`VELLUM_LOG_SPANS=1`).
    pub span_timings: bool,
}

impl TelemetryConfig {
    /// Read `VELLUM_LOG_SPANS`; `RUST_LOG` is read later by [`init`].
    pub fn from_env(service_name: impl Into<String>) -> Self {
        let span_timings = std::env::var("VELLUM_LOG_SPANS")
            .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Self {
            service_name: service_name.into(),
            console_level: default_level(),
            span_timings,
        }
    }

    /// Override the fallback level, e.g. from a `--verbose` flag.
    pub fn with_level(mut self, level: Level) -> Self {
        self.console_level = level;
        self
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.console_level.as_str().to_lowercase()))
    }
}

fn default_level() -> Level {
    if cfg!(debug_assertions) {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

/// Install a compact stderr subscriber. Later calls are ignored.
pub fn init(config: TelemetryConfig) {
    let span_events = if config.span_timings {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let console = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_span_events(span_events)
        .with_writer(std::io::stderr)
        .with_filter(config.filter());

    match tracing_subscriber::registry().with(console).try_init() {
        Ok(()) => tracing::debug!(
            service = %config.service_name,
            level = %config.console_level,
            span_timings = config.span_timings,
            "tracing ready"
        ),
        Err(_) => tracing::trace!("tracing subscriber already installed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_level_overrides_default() {
        let config = TelemetryConfig::from_env("test").with_level(Level::WARN);
        assert_eq!(config.console_level, Level::WARN);
        assert_eq!(config.service_name, "test");
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init(TelemetryConfig::from_env("first"));
        init(TelemetryConfig::from_env("second"));
    }
}
