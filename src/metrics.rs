use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing question-answering activity.
#[derive(Default)]
pub struct QaMetrics {
    requests_processed: AtomicU64,
    requests_failed: AtomicU64,
    rows_indexed: AtomicU64,
    answers_generated: AtomicU64,
}

impl QaMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed request with its indexed row and answer counts.
    pub fn record_request(&self, rows_indexed: u64, answers: u64) {
        self.requests_processed.fetch_add(1, Ordering::Relaxed);
        self.rows_indexed.fetch_add(rows_indexed, Ordering::Relaxed);
        self.answers_generated.fetch_add(answers, Ordering::Relaxed);
    }

    /// Record a request that ended in the generic error response.
    pub fn record_failure(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_processed: self.requests_processed.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            rows_indexed: self.rows_indexed.load(Ordering::Relaxed),
            answers_generated: self.answers_generated.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of the counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Requests that produced a data result.
    pub requests_processed: u64,
    /// Requests that fell back to the generic error message.
    pub requests_failed: u64,
    /// Table rows written to the vector store since startup.
    pub rows_indexed: u64,
    /// Answers returned across all requests.
    pub answers_generated: u64,
}
