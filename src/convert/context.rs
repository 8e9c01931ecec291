//! Per-row and per-member conversion context
//!
//! A [`RowContext`] is created by the orchestrator for each row and a
//! [`MemberContext`] is borrowed from it for each member. Conversion
//! functions take the member context as a parameter, so there is no way to
//! convert outside an active scope, and the scope ends with the borrow.

use super::diagnostics::{DiagnosticEvent, DiagnosticSink, Severity, Strategy};
use crate::config::RuntimeOptions;
use crate::types::TargetType;
use chrono::Utc;
use serde_json::Value;
use std::time::Instant;

pub struct RowContext<'a> {
    row_index: usize,
    options: &'a RuntimeOptions,
    sink: Option<&'a dyn DiagnosticSink>,
}

impl<'a> RowContext<'a> {
    pub fn new(row_index: usize, options: &'a RuntimeOptions, sink: Option<&'a dyn DiagnosticSink>) -> Self {
        RowContext {
            row_index,
            options,
            sink,
        }
    }

    pub fn row_index(&self) -> usize {
        self.row_index
    }

    /// Scope conversions to one member of this row
    pub fn enter<'m>(&'m self, member: &'m str) -> MemberContext<'m> {
        MemberContext { row: self, member }
    }
}

pub struct MemberContext<'a> {
    row: &'a RowContext<'a>,
    member: &'a str,
}

/// What is being attempted, for event construction
#[derive(Clone, Copy)]
pub struct Attempt<'v> {
    pub strategy: Strategy,
    pub target: &'v TargetType,
    pub raw: &'v Value,
    pub started: Option<Instant>,
}

impl Attempt<'_> {
    pub fn with(self, strategy: Strategy) -> Self {
        Attempt { strategy, ..self }
    }
}

impl<'a> MemberContext<'a> {
    pub fn row_index(&self) -> usize {
        self.row.row_index
    }

    pub fn member(&self) -> &'a str {
        self.member
    }

    pub fn options(&self) -> &'a RuntimeOptions {
        self.row.options
    }

    /// Report an event if a sink wants this severity. `message` only runs when it does.
    pub fn emit(
        &self,
        severity: Severity,
        attempt: &Attempt<'_>,
        message: impl FnOnce() -> String,
        error: Option<&str>,
    ) {
        let Some(sink) = self.row.sink.filter(|s| s.accepts(severity)) else {
            return;
        };

        sink.report(DiagnosticEvent {
            severity,
            row_index: self.row.row_index,
            member: self.member.to_string(),
            target_type: attempt.target.to_string(),
            strategy: attempt.strategy,
            attempted_value: self.row.options.include_values.then(|| attempt.raw.clone()),
            message: message(),
            error: error.map(str::to_string),
            elapsed: attempt.started.map(|s| s.elapsed()),
            timestamp: Utc::now(),
        });
    }
}
