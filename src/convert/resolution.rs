//! Error resolution for failed conversions
//!
//! Decision chain, first hit wins:
//! 1. a per-member override value
//! 2. the caller's error handler, if it returns a decision
//! 3. the configured default action
//!
//! Skip decisions come back as [`ConversionOutcome`] variants; only `Throw`
//! and configuration problems produce an `Err`.

use super::context::{Attempt, MemberContext};
use super::diagnostics::{Severity, Strategy};
use crate::config::ErrorAction;
use crate::error::{ConfigError, MaterializeError};
use crate::types::{CellValue, ConversionOutcome, TargetType};
use serde_json::Value;

/// What the caller's callbacks see about a failed conversion
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub row_index: usize,
    pub member_name: String,
    pub attempted_value: Value,
    pub target_type: TargetType,
    /// Last strategy that was attempted
    pub strategy: Strategy,
    pub underlying_error: String,
}

pub(crate) fn resolve_failure(
    ctx: &MemberContext<'_>,
    attempt: &Attempt<'_>,
    reason: String,
) -> Result<ConversionOutcome<CellValue>, MaterializeError> {
    let options = ctx.options();
    let target = attempt.target;

    if let Some(value) = options.field_overrides.get(ctx.member()) {
        if !target.accepts(value) {
            return Err(ConfigError::ValueTypeMismatch {
                member: ctx.member().to_string(),
                target_type: target.to_string(),
                source_name: "override",
            }
            .into());
        }
        ctx.emit(
            Severity::Info,
            &attempt.with(Strategy::Override),
            || "conversion failed, using override value".to_string(),
            Some(reason.as_str()),
        );
        return Ok(ConversionOutcome::Value(value.clone()));
    }

    let error_context = ErrorContext {
        row_index: ctx.row_index(),
        member_name: ctx.member().to_string(),
        attempted_value: attempt.raw.clone(),
        target_type: target.clone(),
        strategy: attempt.strategy,
        underlying_error: reason,
    };

    let action = options
        .error_handler
        .as_ref()
        .and_then(|handler| handler(&error_context))
        .unwrap_or(options.default_action);

    let resolved = attempt.with(Strategy::Resolve);
    let warn = |message: &str| {
        ctx.emit(
            Severity::Warning,
            &resolved,
            || format!("{} ({})", message, error_context.strategy),
            Some(error_context.underlying_error.as_str()),
        );
    };

    match action {
        ErrorAction::Throw => {
            ctx.emit(
                Severity::Error,
                &resolved,
                || format!("conversion failed ({})", error_context.strategy),
                Some(error_context.underlying_error.as_str()),
            );
            Err(MaterializeError::Conversion {
                row_index: error_context.row_index,
                member: error_context.member_name,
                attempted_value: error_context.attempted_value,
                target_type: target.to_string(),
                strategy: error_context.strategy,
                reason: error_context.underlying_error,
            })
        }
        ErrorAction::UseDefault => {
            warn("conversion failed, using default value");
            Ok(ConversionOutcome::Value(target.default_value()))
        }
        ErrorAction::UseCustomValue => {
            let provider = options.fallback_provider.as_ref().ok_or_else(|| {
                ConfigError::MissingFallbackProvider {
                    member: ctx.member().to_string(),
                }
            })?;
            let value = provider(&error_context);
            if !target.accepts(&value) {
                return Err(ConfigError::ValueTypeMismatch {
                    member: ctx.member().to_string(),
                    target_type: target.to_string(),
                    source_name: "fallback",
                }
                .into());
            }
            warn("conversion failed, using fallback value");
            Ok(ConversionOutcome::Value(value))
        }
        ErrorAction::SkipProperty => {
            warn("conversion failed, member skipped");
            Ok(ConversionOutcome::SkipProperty)
        }
        ErrorAction::SkipRow => {
            warn("conversion failed, row skipped");
            Ok(ConversionOutcome::SkipRow)
        }
    }
}
