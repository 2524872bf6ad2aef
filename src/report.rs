//! Reporting seam for pipeline events.
//!
//! Components receive a reporter at construction instead of logging through
//! shared global state, so alerting sinks can be swapped per pipeline.
use crate::model::RetryState;
use crate::review::ReviewEntry;
use crate::util::truncate_string;
use std::sync::Mutex;

/// Sink for the externally observable pipeline events.
pub trait Reporter {
    /// A retry is about to sleep for `state.delay` before re-attempting.
    fn retry_scheduled(&self, context_label: &str, state: &RetryState, error: &str);

    /// A suggestion was quarantined for human review.
    fn item_queued(&self, entry: &ReviewEntry);

    /// A structurally invalid suggestion was discarded.
    fn item_dropped(&self, name: &str, reason: &str);

    /// Model output could not be repaired into JSON.
    fn repair_failed(&self, raw_preview: &str);
}

/// Emits one structured `tracing` line per event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn retry_scheduled(&self, context_label: &str, state: &RetryState, error: &str) {
        tracing::warn!(
            context = context_label,
            class = %state.class,
            attempt = state.attempt,
            delay_ms = state.delay.as_millis() as u64,
            error = %truncate_string(error, 200),
            "model request failed; retrying"
        );
    }

    fn item_queued(&self, entry: &ReviewEntry) {
        tracing::info!(
            id = entry.id,
            name = %entry.name,
            reason = %entry.failure_reason,
            "suggestion queued for review"
        );
    }

    fn item_dropped(&self, name: &str, reason: &str) {
        tracing::info!(name, reason, "suggestion dropped");
    }

    fn repair_failed(&self, raw_preview: &str) {
        tracing::warn!(
            preview = %truncate_string(raw_preview, 200),
            "unrecoverable JSON in model output"
        );
    }
}

/// Event captured by [`CollectingReporter`].
#[derive(Debug, Clone, PartialEq)]
pub enum ReportedEvent {
    Retry {
        context_label: String,
        state: RetryState,
    },
    Queued {
        id: u64,
        reason: String,
    },
    Dropped {
        name: String,
        reason: String,
    },
    RepairFailed,
}

/// Keeps events in memory; used by tests and dry runs.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<ReportedEvent>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ReportedEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    fn push(&self, event: ReportedEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl Reporter for CollectingReporter {
    fn retry_scheduled(&self, context_label: &str, state: &RetryState, _error: &str) {
        self.push(ReportedEvent::Retry {
            context_label: context_label.to_string(),
            state: state.clone(),
        });
    }

    fn item_queued(&self, entry: &ReviewEntry) {
        self.push(ReportedEvent::Queued {
            id: entry.id,
            reason: entry.failure_reason.to_string(),
        });
    }

    fn item_dropped(&self, name: &str, reason: &str) {
        self.push(ReportedEvent::Dropped {
            name: name.to_string(),
            reason: reason.to_string(),
        });
    }

    fn repair_failed(&self, _raw_preview: &str) {
        self.push(ReportedEvent::RepairFailed);
    }
}
