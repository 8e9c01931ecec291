use super::context::{Attempt, MemberContext};
use super::diagnostics::{Severity, Strategy};
use super::parse::{direct, stringify, value_kind, widen, ParseSettings};
use super::resolution::resolve_failure;
use crate::config::{CompileOptions, EmptyValuePolicy};
use crate::error::{ConfigError, MaterializeError};
use crate::types::{CellValue, ConversionOutcome, TargetType};
use serde_json::Value;
use std::time::Instant;

/// Converts raw values into typed cells.
///
/// Holds only settings fixed at plan compile time; everything per-call comes
/// in through the [`MemberContext`].
#[derive(Debug, Clone)]
pub struct ConversionEngine {
    settings: ParseSettings,
}

impl ConversionEngine {
    pub fn new(options: &CompileOptions) -> Result<Self, ConfigError> {
        Ok(ConversionEngine {
            settings: ParseSettings::from_options(options)?,
        })
    }

    pub fn settings(&self) -> &ParseSettings {
        &self.settings
    }

    /// Convert one raw value for the member `ctx` is scoped to.
    ///
    /// Strategies in order: empty-value policy, direct assignment, string
    /// parsing or numeric widening, optional generic coercion, then error
    /// resolution.
    pub fn convert(
        &self,
        raw: &Value,
        target: &TargetType,
        ctx: &MemberContext<'_>,
    ) -> Result<ConversionOutcome<CellValue>, MaterializeError> {
        let options = ctx.options();
        let attempt = Attempt {
            strategy: Strategy::Direct,
            target,
            raw,
            started: options.capture_timing.then(Instant::now),
        };

        if is_empty(raw, target) {
            return self.convert_empty(ctx, &attempt.with(Strategy::Empty));
        }

        let underlying = target.underlying();

        if let Some(cell) = direct(raw, underlying) {
            ctx.emit(Severity::Trace, &attempt, || "assigned directly".to_string(), None);
            return Ok(ConversionOutcome::Value(cell));
        }

        let (strategy, result) = match raw {
            Value::String(text) => (
                Strategy::Parse,
                self.settings.parse_str(text, underlying, options.case_insensitive_enums),
            ),
            other => (Strategy::Widen, widen(other, underlying)),
        };
        let mut attempt = attempt.with(strategy);

        let mut reason = match result {
            Ok(cell) => {
                ctx.emit(Severity::Debug, &attempt, || format!("converted by {}", strategy), None);
                return Ok(ConversionOutcome::Value(cell));
            }
            Err(reason) => {
                ctx.emit(Severity::Debug, &attempt, || format!("{} failed", strategy), Some(reason.as_str()));
                reason
            }
        };

        if options.allow_generic_coercion && !raw.is_string() {
            attempt = attempt.with(Strategy::Coerce);
            let text = stringify(raw);
            match self
                .settings
                .parse_str(&text, underlying, options.case_insensitive_enums)
            {
                Ok(cell) => {
                    ctx.emit(
                        Severity::Warning,
                        &attempt,
                        || format!("{} value converted by slow generic coercion", value_kind(raw)),
                        None,
                    );
                    return Ok(ConversionOutcome::Value(cell));
                }
                Err(coerce_reason) => {
                    ctx.emit(Severity::Debug, &attempt, || "coercion failed".to_string(), Some(coerce_reason.as_str()));
                    reason = coerce_reason;
                }
            }
        }

        resolve_failure(ctx, &attempt, reason)
    }

    fn convert_empty(
        &self,
        ctx: &MemberContext<'_>,
        attempt: &Attempt<'_>,
    ) -> Result<ConversionOutcome<CellValue>, MaterializeError> {
        let target = attempt.target;
        let cell = match ctx.options().empty_policy {
            EmptyValuePolicy::Error => {
                return resolve_failure(ctx, attempt, "value is null or empty".to_string());
            }
            EmptyValuePolicy::ConvertToDefault => target.default_value(),
            EmptyValuePolicy::PreserveEmptyStrings => match attempt.raw {
                Value::String(s) if target.is_string() => CellValue::Str(s.clone()),
                _ => target.default_value(),
            },
        };

        ctx.emit(Severity::Debug, attempt, || "empty value handled by policy".to_string(), None);
        Ok(ConversionOutcome::Value(cell))
    }
}

/// Null, "", or whitespace-only for non-string targets
fn is_empty(raw: &Value, target: &TargetType) -> bool {
    match raw {
        Value::Null => true,
        Value::String(s) => s.is_empty() || (!target.is_string() && s.trim().is_empty()),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ErrorAction, RuntimeOptions};
    use crate::convert::context::RowContext;
    use crate::convert::diagnostics::MemorySink;
    use serde_json::json;
    use std::sync::Arc;

    fn engine() -> ConversionEngine {
        ConversionEngine::new(&CompileOptions::default()).unwrap()
    }

    fn convert_with(
        options: &RuntimeOptions,
        raw: Value,
        target: TargetType,
    ) -> Result<ConversionOutcome<CellValue>, MaterializeError> {
        let row = RowContext::new(0, options, options.sink.as_deref());
        let ctx = row.enter("Field");
        engine().convert(&raw, &target, &ctx)
    }

    #[test]
    fn test_primitive_round_trips() {
        let options = RuntimeOptions::default();
        let cases = vec![
            (json!(i32::MIN.to_string()), TargetType::I32, CellValue::Int(i32::MIN as i64)),
            (json!("65535"), TargetType::U16, CellValue::UInt(65535)),
            (json!("true"), TargetType::Bool, CellValue::Bool(true)),
            (json!("-0.25"), TargetType::F64, CellValue::Float(-0.25)),
            (json!("text"), TargetType::String, CellValue::Str("text".to_string())),
        ];
        for (raw, target, expected) in cases {
            assert_eq!(
                convert_with(&options, raw, target).unwrap(),
                ConversionOutcome::Value(expected)
            );
        }
    }

    #[test]
    fn test_nullable_targets() {
        let options = RuntimeOptions::default();
        let target = TargetType::nullable(TargetType::I32);
        assert_eq!(
            convert_with(&options, Value::Null, target.clone()).unwrap(),
            ConversionOutcome::Value(CellValue::Null)
        );
        assert_eq!(
            convert_with(&options, json!("12"), target).unwrap(),
            ConversionOutcome::Value(CellValue::Int(12))
        );
    }

    #[test]
    fn test_empty_value_policies() {
        let preserve = RuntimeOptions::default().with_empty_policy(EmptyValuePolicy::PreserveEmptyStrings);
        let opt_string = TargetType::nullable(TargetType::String);
        assert_eq!(
            convert_with(&preserve, json!(""), opt_string.clone()).unwrap(),
            ConversionOutcome::Value(CellValue::Str(String::new()))
        );
        assert_eq!(
            convert_with(&RuntimeOptions::default(), json!(""), opt_string).unwrap(),
            ConversionOutcome::Value(CellValue::Null)
        );
        assert_eq!(
            convert_with(&preserve, json!("  "), TargetType::I32).unwrap(),
            ConversionOutcome::Value(CellValue::Int(0))
        );

        let strict = RuntimeOptions::default().with_empty_policy(EmptyValuePolicy::Error);
        let err = convert_with(&strict, json!(""), TargetType::String).unwrap_err();
        assert_eq!(err.member(), Some("Field"));
    }

    #[test]
    fn test_failure_throws_by_default() {
        let err = convert_with(&RuntimeOptions::default(), json!("thirty"), TargetType::I32).unwrap_err();
        match err {
            MaterializeError::Conversion { member, strategy, attempted_value, target_type, .. } => {
                assert_eq!(member, "Field");
                assert_eq!(strategy, Strategy::Parse);
                assert_eq!(attempted_value, json!("thirty"));
                assert_eq!(target_type, "i32");
            }
            other => panic!("expected conversion error, got {:?}", other),
        }
    }

    #[test]
    fn test_resolution_actions() {
        let skip_row = RuntimeOptions::default().with_default_action(ErrorAction::SkipRow);
        assert!(convert_with(&skip_row, json!("x"), TargetType::I32).unwrap().is_skip_row());

        let skip_prop = RuntimeOptions::default().with_default_action(ErrorAction::SkipProperty);
        assert_eq!(
            convert_with(&skip_prop, json!("x"), TargetType::I32).unwrap(),
            ConversionOutcome::SkipProperty
        );

        let use_default = RuntimeOptions::default().with_default_action(ErrorAction::UseDefault);
        assert_eq!(
            convert_with(&use_default, json!("x"), TargetType::Bool).unwrap(),
            ConversionOutcome::Value(CellValue::Bool(false))
        );
    }

    #[test]
    fn test_callback_decision_and_fallback() {
        let options = RuntimeOptions::default()
            .on_error(|ctx| {
                assert_eq!(ctx.member_name, "Field");
                Some(ErrorAction::UseCustomValue)
            })
            .with_fallback(|_| CellValue::Int(-1));
        assert_eq!(
            convert_with(&options, json!("x"), TargetType::I32).unwrap(),
            ConversionOutcome::Value(CellValue::Int(-1))
        );

        // a deferring callback falls through to the default action
        let deferring = RuntimeOptions::default()
            .on_error(|_| None)
            .with_default_action(ErrorAction::UseDefault);
        assert_eq!(
            convert_with(&deferring, json!("x"), TargetType::I32).unwrap(),
            ConversionOutcome::Value(CellValue::Int(0))
        );
    }

    #[test]
    fn test_custom_value_without_provider_is_configuration_error() {
        let options = RuntimeOptions::default().with_default_action(ErrorAction::UseCustomValue);
        let err = convert_with(&options, json!("x"), TargetType::I32).unwrap_err();
        assert!(matches!(
            err,
            MaterializeError::Configuration(ConfigError::MissingFallbackProvider { .. })
        ));
    }

    #[test]
    fn test_fallback_of_wrong_type_is_rejected() {
        let options = RuntimeOptions::default()
            .with_default_action(ErrorAction::UseCustomValue)
            .with_fallback(|_| CellValue::Str("nope".to_string()));
        let err = convert_with(&options, json!("x"), TargetType::I32).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_override_short_circuits_callback() {
        let options = RuntimeOptions::default()
            .with_override("Field", CellValue::Int(99))
            .on_error(|_| panic!("handler must not run when an override exists"));
        assert_eq!(
            convert_with(&options, json!("x"), TargetType::I32).unwrap(),
            ConversionOutcome::Value(CellValue::Int(99))
        );
    }

    #[test]
    fn test_widening_and_generic_coercion() {
        let options = RuntimeOptions::default();
        assert_eq!(
            convert_with(&options, json!(7), TargetType::U8).unwrap(),
            ConversionOutcome::Value(CellValue::UInt(7))
        );
        assert!(convert_with(&options, json!(7), TargetType::String).is_err());

        let sink = Arc::new(MemorySink::new(Severity::Warning));
        let mut coercing = RuntimeOptions::default().with_sink(sink.clone());
        coercing.allow_generic_coercion = true;
        assert_eq!(
            convert_with(&coercing, json!(7), TargetType::String).unwrap(),
            ConversionOutcome::Value(CellValue::Str("7".to_string()))
        );
        assert_eq!(
            convert_with(&coercing, json!(1), TargetType::Bool).unwrap(),
            ConversionOutcome::Value(CellValue::Bool(true))
        );
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.strategy == Strategy::Coerce));
    }

    #[test]
    fn test_diagnostics_respect_threshold_and_withholding() {
        let sink = Arc::new(MemorySink::new(Severity::Trace));
        let mut options = RuntimeOptions::default()
            .with_sink(sink.clone())
            .with_default_action(ErrorAction::UseDefault);
        options.include_values = false;
        options.capture_timing = true;

        convert_with(&options, json!("abc"), TargetType::String).unwrap();
        convert_with(&options, json!("bad"), TargetType::I32).unwrap();

        let events = sink.events();
        assert_eq!(events[0].strategy, Strategy::Direct);
        assert_eq!(events[0].severity, Severity::Trace);
        assert!(events.iter().all(|e| e.attempted_value.is_none()));
        assert!(events.iter().all(|e| e.elapsed.is_some()));
        assert_eq!(sink.of_severity(Severity::Warning).len(), 1);

        let quiet = Arc::new(MemorySink::new(Severity::Error));
        let options = RuntimeOptions::default()
            .with_sink(quiet.clone())
            .with_default_action(ErrorAction::UseDefault);
        convert_with(&options, json!("bad"), TargetType::I32).unwrap();
        assert!(quiet.is_empty());
    }
}
