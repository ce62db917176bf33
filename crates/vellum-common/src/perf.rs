//! Performance timing utilities for instrumentation.
//!
//! `web_time::Instant` is `std::time::Instant` on native targets and backed by
//! `Performance.now()` in the browser, so the same code times both.

use web_time::Instant;

/// Milliseconds elapsed since the first call in this process.
pub fn now() -> f64 {
    static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    let start = START.get_or_init(Instant::now);
    start.elapsed().as_secs_f64() * 1000.0
}

/// Measure the execution time of a closure and log it.
///
/// Returns the closure's result together with the elapsed milliseconds.
pub fn measure<T, F: FnOnce() -> T>(label: &str, f: F) -> (T, f64) {
    let start = now();
    let result = f();
    let elapsed = now() - start;
    tracing::debug!(target: "vellum::perf", elapsed_ms = elapsed, "{}", label);
    (result, elapsed)
}

/// A guard that logs elapsed time when dropped.
pub struct TimingGuard {
    label: &'static str,
    start: f64,
}

impl TimingGuard {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            start: now(),
        }
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        let elapsed = now() - self.start;
        tracing::trace!(target: "vellum::perf", elapsed_ms = elapsed, "{}", self.label);
    }
}

/// Accumulates repeated samples of one operation.
#[derive(Debug, Clone, Default)]
pub struct Samples {
    values: Vec<f64>,
}

impl Samples {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` once and record how long it took.
    pub fn record<T, F: FnOnce() -> T>(&mut self, f: F) -> T {
        let start = now();
        let result = f();
        self.values.push(now() - start);
        result
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    pub fn max(&self) -> f64 {
        self.values.iter().copied().fold(0.0, f64::max)
    }

    /// Nearest-rank percentile, `p` in `0.0..=100.0`.
    pub fn percentile(&self, p: f64) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let mut sorted = self.values.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
        sorted[rank.clamp(1, sorted.len()) - 1]
    }
}
