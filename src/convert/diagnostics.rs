//! Diagnostic events and the sink capability that receives them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
}

/// The conversion strategy an event or error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    /// Value already had the target shape
    Direct,
    /// Null or empty input handled by the empty-value policy
    Empty,
    /// Culture-aware string parsing
    Parse,
    /// Numeric or enum widening of a non-string value
    Widen,
    /// Slow stringify-and-reparse fallback
    Coerce,
    /// Per-member override value
    Override,
    /// Error resolution decision
    Resolve,
}

impl Strategy {
    pub fn name(self) -> &'static str {
        match self {
            Strategy::Direct => "direct",
            Strategy::Empty => "empty",
            Strategy::Parse => "parse",
            Strategy::Widen => "widen",
            Strategy::Coerce => "coerce",
            Strategy::Override => "override",
            Strategy::Resolve => "resolve",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One conversion attempt, as reported to a sink
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticEvent {
    pub severity: Severity,
    pub row_index: usize,
    pub member: String,
    pub target_type: String,
    pub strategy: Strategy,
    /// `None` when values are withheld
    pub attempted_value: Option<Value>,
    pub message: String,
    pub error: Option<String>,
    pub elapsed: Option<Duration>,
    pub timestamp: DateTime<Utc>,
}

/// Receiver of diagnostic events.
///
/// `min_severity` is consulted before an event is built, so a quiet sink
/// keeps conversions on the fast path.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, event: DiagnosticEvent);

    fn min_severity(&self) -> Severity {
        Severity::Info
    }

    /// Whether concurrent `report` calls are serialized by the sink itself
    fn is_concurrency_safe(&self) -> bool {
        false
    }

    fn accepts(&self, severity: Severity) -> bool {
        severity >= self.min_severity()
    }
}

/// Sink that keeps events in memory
#[derive(Debug)]
pub struct MemorySink {
    min_severity: Severity,
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl MemorySink {
    pub fn new(min_severity: Severity) -> Self {
        MemorySink {
            min_severity,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drain all collected events
    pub fn take(&self) -> Vec<DiagnosticEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn of_severity(&self, severity: Severity) -> Vec<DiagnosticEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.severity == severity)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new(Severity::Info)
    }
}

impl DiagnosticSink for MemorySink {
    fn report(&self, event: DiagnosticEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    fn min_severity(&self) -> Severity {
        self.min_severity
    }

    fn is_concurrency_safe(&self) -> bool {
        true
    }
}
