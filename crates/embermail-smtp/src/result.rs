//! Per-send outcome records.

use chrono::{DateTime, Utc};

/// Audit record for one send attempt.
#[derive(Debug, Clone)]
pub struct SendRecord {
    /// Whether the server accepted the whole DATA transaction.
    pub success: bool,
    /// Human-readable reason; the server's text on failure.
    pub reason: String,
    /// When the attempt finished.
    pub timestamp: DateTime<Utc>,
    /// Recipient addresses the envelope was attempted for.
    pub recipients: Vec<String>,
    /// Subject echoed back for audit.
    pub subject: String,
}

/// Collected results across a session's send attempts.
#[derive(Debug, Clone, Default)]
pub struct SendingResults {
    records: Vec<SendRecord>,
    completed: usize,
    failed: usize,
}

impl SendingResults {
    /// Creates an empty collector.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
            completed: 0,
            failed: 0,
        }
    }

    /// Appends a record, updating the cumulative counters.
    pub fn push(&mut self, record: SendRecord) {
        if record.success {
            self.completed += 1;
        } else {
            self.failed += 1;
        }
        self.records.push(record);
    }

    /// All records in attempt order.
    #[must_use]
    pub fn records(&self) -> &[SendRecord] {
        &self.records
    }

    /// Number of successful sends.
    #[must_use]
    pub const fn completed(&self) -> usize {
        self.completed
    }

    /// Number of failed sends.
    #[must_use]
    pub const fn failed(&self) -> usize {
        self.failed
    }

    /// Drops all records and counters.
    pub fn clear(&mut self) {
        self.records.clear();
        self.completed = 0;
        self.failed = 0;
    }
}
