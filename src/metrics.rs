//! Operation counters exposed on `/status`.
//!
//! All counters are backed by atomics for lock-free concurrent access.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{ErrorKind, OperationError};

/// Aggregated outcomes of the lifecycle operations served by this process.
///
/// Thread-safe via atomics; shared through `web::Data`.
pub struct Metrics {
    /// Operations started.
    pub operations_submitted: AtomicU64,
    /// Operations whose transaction confirmed.
    pub operations_confirmed: AtomicU64,
    /// Operations refused by the raffle program.
    pub operations_rejected: AtomicU64,
    /// Operations that failed before or outside program execution
    /// (probe, transport, funds, confirmation timeout).
    pub operations_failed: AtomicU64,
    /// Of the failures, those whose outcome is unknown.
    pub confirmation_timeouts: AtomicU64,
    /// Sum of confirmed operation latencies in milliseconds.
    pub confirmation_latency_sum_ms: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            operations_submitted: AtomicU64::new(0),
            operations_confirmed: AtomicU64::new(0),
            operations_rejected: AtomicU64::new(0),
            operations_failed: AtomicU64::new(0),
            confirmation_timeouts: AtomicU64::new(0),
            confirmation_latency_sum_ms: AtomicU64::new(0),
        }
    }

    pub fn record_submission(&self) {
        self.operations_submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a confirmed operation with its end-to-end latency.
    pub fn record_confirmation(&self, latency_ms: u64) {
        self.operations_confirmed.fetch_add(1, Ordering::Relaxed);
        self.confirmation_latency_sum_ms
            .fetch_add(latency_ms, Ordering::Relaxed);
    }

    /// Record a failed operation under the counter its error kind belongs to.
    pub fn record_error(&self, err: &OperationError) {
        match err.kind {
            ErrorKind::Rejected(_) => {
                self.operations_rejected.fetch_add(1, Ordering::Relaxed);
            }
            ErrorKind::ConfirmationTimeout { .. } => {
                self.confirmation_timeouts.fetch_add(1, Ordering::Relaxed);
                self.operations_failed.fetch_add(1, Ordering::Relaxed);
            }
            _ => {
                self.operations_failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Average confirmation latency in milliseconds, or 0 if none.
    pub fn avg_latency_ms(&self) -> u64 {
        let count = self.operations_confirmed.load(Ordering::Relaxed);
        if count == 0 {
            return 0;
        }
        self.confirmation_latency_sum_ms.load(Ordering::Relaxed) / count
    }

    /// Serialize metrics as a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "operations_submitted": self.operations_submitted.load(Ordering::Relaxed),
            "operations_confirmed": self.operations_confirmed.load(Ordering::Relaxed),
            "operations_rejected": self.operations_rejected.load(Ordering::Relaxed),
            "operations_failed": self.operations_failed.load(Ordering::Relaxed),
            "confirmation_timeouts": self.confirmation_timeouts.load(Ordering::Relaxed),
            "avg_confirmation_latency_ms": self.avg_latency_ms(),
        })
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
