//! Diagnostic sinks and tracing setup.
//!
//! Queue diagnostics (dumps and reported failures) are plain lines handed to a
//! [`DiagnosticSink`]. The default sink forwards them to `tracing`; tests
//! capture them with [`MemorySink`].

use std::sync::{Arc, Mutex};

use tracing_subscriber::EnvFilter;

use crate::config::EnvConfig;

pub const LOG_TARGET: &str = "resize_queue";

/// Line-oriented diagnostic channel.
pub trait DiagnosticSink: Send + Sync {
    fn info(&self, line: &str);
    fn error(&self, line: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn info(&self, line: &str) {
        tracing::info!(target: LOG_TARGET, "{line}");
    }

    fn error(&self, line: &str) {
        tracing::error!(target: LOG_TARGET, "{line}");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Info,
    Error,
}

/// Captures diagnostic lines in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<(DiagnosticLevel, String)>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(DiagnosticLevel, String)> {
        self.lock().clone()
    }

    pub fn info_lines(&self) -> Vec<String> {
        self.filtered(DiagnosticLevel::Info)
    }

    pub fn error_lines(&self) -> Vec<String> {
        self.filtered(DiagnosticLevel::Error)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn filtered(&self, level: DiagnosticLevel) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|(entry_level, _)| *entry_level == level)
            .map(|(_, line)| line.clone())
            .collect()
    }

    fn push(&self, level: DiagnosticLevel, line: &str) {
        self.lock().push((level, line.to_string()));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(DiagnosticLevel, String)>> {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DiagnosticSink for MemorySink {
    fn info(&self, line: &str) {
        self.push(DiagnosticLevel::Info, line);
    }

    fn error(&self, line: &str) {
        self.push(DiagnosticLevel::Error, line);
    }
}

/// Filter used when `RUST_LOG` is not set.
pub fn default_filter(config: &EnvConfig) -> String {
    if let Some(filter) = config.log_filter.as_deref() {
        return filter.to_string();
    }
    if config.debug {
        format!("{LOG_TARGET}=debug")
    } else {
        format!("{LOG_TARGET}=info")
    }
}

/// Install a global `fmt` subscriber. Returns `false` if one was already set.
pub fn init_tracing(config: &EnvConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(config)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
