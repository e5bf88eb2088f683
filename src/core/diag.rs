//! Injected diagnostic sink.
//!
//! The store and the algebra passes report non-fatal conditions (the raw-0
//! target sentinel, body capacity growth) through a sink handle supplied at
//! construction instead of a process-wide logger, so they stay testable
//! without global state.

use std::sync::Arc;

/// Receiver for non-fatal diagnostics emitted by the store and algebra.
pub trait DiagSink {
    /// A condition the caller should know about but that does not fail the
    /// operation (e.g. a raw 0 transition target treated as "no target").
    fn warn(&self, message: &str);
    /// Informational notice (e.g. a body rewrite after capacity growth).
    fn note(&self, message: &str);
}

/// Cloneable handle threaded through stores and derived automata.
pub type DiagHandle = Arc<dyn DiagSink + Send + Sync>;

/// Sink that renders diagnostics to stderr.
pub struct ConsoleSink;

impl DiagSink for ConsoleSink {
    fn warn(&self, message: &str) {
        use colored::Colorize;
        eprintln!("{} {}", "warning:".yellow().bold(), message);
    }

    fn note(&self, message: &str) {
        use colored::Colorize;
        eprintln!("{} {}", "note:".dimmed(), message);
    }
}

/// Sink that drops everything. Useful in tests and batch runs.
pub struct NullSink;

impl DiagSink for NullSink {
    fn warn(&self, _message: &str) {}
    fn note(&self, _message: &str) {}
}

/// Stderr-backed handle.
pub fn console() -> DiagHandle {
    Arc::new(ConsoleSink)
}

/// Silent handle.
pub fn null() -> DiagHandle {
    Arc::new(NullSink)
}
