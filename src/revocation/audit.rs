use std::sync::{Mutex, PoisonError};

/// Sink for per-serial revocation messages.
///
/// Passed explicitly to the orchestrator and the dry-run revoker so that
/// concurrent batches (and tests) never share log state.
pub trait AuditLog: Send + Sync + 'static {
    fn info(&self, message: String);
    fn warn(&self, message: String);
    fn error(&self, message: String);
}

/// Forwards audit messages to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditLog;

impl AuditLog for TracingAuditLog {
    fn info(&self, message: String) {
        tracing::info!(target: "audit", "{message}");
    }

    fn warn(&self, message: String) {
        tracing::warn!(target: "audit", "{message}");
    }

    fn error(&self, message: String) {
        tracing::error!(target: "audit", "{message}");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditLevel {
    Info,
    Warn,
    Error,
}

/// Keeps audit messages in memory.
///
/// Useful for testing and development.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    lines: Mutex<Vec<(AuditLevel, String)>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_all(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, line)| line.clone())
            .collect()
    }

    /// Lines containing `needle`.
    pub fn get_all_matching(&self, needle: &str) -> Vec<String> {
        self.get_all()
            .into_iter()
            .filter(|line| line.contains(needle))
            .collect()
    }

    pub fn count_at(&self, level: AuditLevel) -> usize {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(l, _)| *l == level)
            .count()
    }

    pub fn clear(&self) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn push(&self, level: AuditLevel, message: String) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((level, message));
    }
}

impl AuditLog for MemoryAuditLog {
    fn info(&self, message: String) {
        self.push(AuditLevel::Info, message);
    }

    fn warn(&self, message: String) {
        self.push(AuditLevel::Warn, message);
    }

    fn error(&self, message: String) {
        self.push(AuditLevel::Error, message);
    }
}
