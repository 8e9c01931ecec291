//! Compile-time and runtime options
//!
//! [`CompileOptions`] are baked into a cached [`Plan`](crate::plan::Plan) and form
//! its cache key. [`RuntimeOptions`] travel with each call and never affect
//! which plan is used.

use crate::convert::{DiagnosticSink, ErrorContext};
use crate::error::ConfigError;
use crate::schema::ResolverOptions;
use crate::types::CellValue;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Locale rules used when parsing strings
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Culture {
    pub name: String,
    pub decimal_separator: char,
    pub group_separator: char,
    /// chrono format strings tried for date targets
    pub date_formats: Vec<String>,
    /// chrono format strings tried for date-time targets
    pub datetime_formats: Vec<String>,
}

impl Culture {
    fn build(name: &str, decimal: char, group: char, dates: &[&str], datetimes: &[&str]) -> Self {
        Culture {
            name: name.to_string(),
            decimal_separator: decimal,
            group_separator: group,
            date_formats: dates.iter().map(|s| s.to_string()).collect(),
            datetime_formats: datetimes.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn invariant() -> Self {
        Self::build(
            "invariant",
            '.',
            ',',
            &["%Y-%m-%d", "%m/%d/%Y"],
            &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%m/%d/%Y %H:%M:%S"],
        )
    }

    pub fn en_us() -> Self {
        Self::build(
            "en-US",
            '.',
            ',',
            &["%m/%d/%Y", "%Y-%m-%d"],
            &["%m/%d/%Y %H:%M:%S", "%m/%d/%Y %I:%M:%S %p", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"],
        )
    }

    pub fn en_gb() -> Self {
        Self::build(
            "en-GB",
            '.',
            ',',
            &["%d/%m/%Y", "%Y-%m-%d"],
            &["%d/%m/%Y %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"],
        )
    }

    pub fn de_de() -> Self {
        Self::build(
            "de-DE",
            ',',
            '.',
            &["%d.%m.%Y", "%Y-%m-%d"],
            &["%d.%m.%Y %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"],
        )
    }

    pub fn fr_fr() -> Self {
        Self::build(
            "fr-FR",
            ',',
            ' ',
            &["%d/%m/%Y", "%Y-%m-%d"],
            &["%d/%m/%Y %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"],
        )
    }

    /// Look up a preset by name (case-insensitive); "" means invariant
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "" | "invariant" => Some(Self::invariant()),
            "en-us" => Some(Self::en_us()),
            "en-gb" => Some(Self::en_gb()),
            "de-de" => Some(Self::de_de()),
            "fr-fr" => Some(Self::fr_fr()),
            _ => None,
        }
    }
}

impl Default for Culture {
    fn default() -> Self {
        Self::invariant()
    }
}

/// Settings that shape a compiled plan.
///
/// The whole value is the plan cache fingerprint: two equal option sets
/// always share a plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompileOptions {
    pub culture: Culture,
    /// Accept group separators ("1,234") in numeric strings
    pub allow_thousands_separators: bool,
    /// Explicit formats that replace the culture's date and date-time formats
    pub date_formats: Vec<String>,
    pub case_sensitive_headers: bool,
    pub resolver: ResolverOptions,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            culture: Culture::invariant(),
            allow_thousands_separators: true,
            date_formats: Vec::new(),
            case_sensitive_headers: false,
            resolver: ResolverOptions::default(),
        }
    }
}

impl CompileOptions {
    pub fn with_culture(mut self, culture: Culture) -> Self {
        self.culture = culture;
        self
    }

    pub fn with_date_format(mut self, format: impl Into<String>) -> Self {
        self.date_formats.push(format.into());
        self
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.culture.decimal_separator == self.culture.group_separator {
            return Err(ConfigError::InvalidCompileOptions(format!(
                "culture '{}' uses '{}' as both decimal and group separator",
                self.culture.name, self.culture.decimal_separator
            )));
        }
        if self.date_formats.iter().any(|f| f.trim().is_empty()) {
            return Err(ConfigError::InvalidCompileOptions(
                "explicit date formats must not be empty".to_string(),
            ));
        }
        if self.resolver.min_resemblance == 0 {
            return Err(ConfigError::InvalidCompileOptions(
                "resemblance threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// What to do with a null or empty input value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyValuePolicy {
    /// Treat as a conversion error and run error resolution
    Error,
    /// Use the target type's default value
    #[default]
    ConvertToDefault,
    /// Keep "" for string targets, default value otherwise
    PreserveEmptyStrings,
}

/// Decision taken for a failed conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorAction {
    #[default]
    Throw,
    UseDefault,
    UseCustomValue,
    SkipProperty,
    SkipRow,
}

/// Caller error callback; `None` defers to [`RuntimeOptions::default_action`]
pub type ErrorHandler = Arc<dyn Fn(&ErrorContext) -> Option<ErrorAction> + Send + Sync>;

/// Supplies the value for [`ErrorAction::UseCustomValue`]
pub type FallbackProvider = Arc<dyn Fn(&ErrorContext) -> CellValue + Send + Sync>;

/// Per-call settings. Never part of the plan cache key.
#[derive(Clone)]
pub struct RuntimeOptions {
    pub empty_policy: EmptyValuePolicy,
    pub default_action: ErrorAction,
    pub error_handler: Option<ErrorHandler>,
    pub fallback_provider: Option<FallbackProvider>,
    /// Values used in place of failed conversions, keyed by member name
    pub field_overrides: HashMap<String, CellValue>,
    pub sink: Option<Arc<dyn DiagnosticSink>>,
    /// Include attempted values in diagnostic events
    pub include_values: bool,
    pub capture_timing: bool,
    /// Enable the slow stringify-and-reparse fallback for non-string sources
    pub allow_generic_coercion: bool,
    pub case_insensitive_enums: bool,
    pub max_degree_of_parallelism: Option<usize>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        RuntimeOptions {
            empty_policy: EmptyValuePolicy::default(),
            default_action: ErrorAction::default(),
            error_handler: None,
            fallback_provider: None,
            field_overrides: HashMap::new(),
            sink: None,
            include_values: true,
            capture_timing: false,
            allow_generic_coercion: false,
            case_insensitive_enums: false,
            max_degree_of_parallelism: None,
        }
    }
}

impl RuntimeOptions {
    pub fn with_default_action(mut self, action: ErrorAction) -> Self {
        self.default_action = action;
        self
    }

    pub fn with_empty_policy(mut self, policy: EmptyValuePolicy) -> Self {
        self.empty_policy = policy;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ErrorContext) -> Option<ErrorAction> + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    pub fn with_fallback<F>(mut self, provider: F) -> Self
    where
        F: Fn(&ErrorContext) -> CellValue + Send + Sync + 'static,
    {
        self.fallback_provider = Some(Arc::new(provider));
        self
    }

    pub fn with_override(mut self, member: impl Into<String>, value: CellValue) -> Self {
        self.field_overrides.insert(member.into(), value);
        self
    }
}

impl fmt::Debug for RuntimeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeOptions")
            .field("empty_policy", &self.empty_policy)
            .field("default_action", &self.default_action)
            .field("error_handler", &self.error_handler.is_some())
            .field("fallback_provider", &self.fallback_provider.is_some())
            .field("field_overrides", &self.field_overrides)
            .field("sink", &self.sink.is_some())
            .field("include_values", &self.include_values)
            .field("capture_timing", &self.capture_timing)
            .field("allow_generic_coercion", &self.allow_generic_coercion)
            .field("case_insensitive_enums", &self.case_insensitive_enums)
            .field("max_degree_of_parallelism", &self.max_degree_of_parallelism)
            .finish()
    }
}

/// File-loadable policy settings.
///
/// Covers everything serialisable in [`CompileOptions`] and [`RuntimeOptions`];
/// callbacks and sinks are attached in code afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub culture: String,
    pub allow_thousands_separators: bool,
    pub date_formats: Vec<String>,
    pub case_sensitive_headers: bool,
    pub min_resemblance: u32,
    pub max_edit_distance: usize,
    pub empty_policy: EmptyValuePolicy,
    pub default_action: ErrorAction,
    pub include_values: bool,
    pub capture_timing: bool,
    pub allow_generic_coercion: bool,
    pub case_insensitive_enums: bool,
    pub max_degree_of_parallelism: Option<usize>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        let compile = CompileOptions::default();
        let runtime = RuntimeOptions::default();
        PolicyConfig {
            culture: compile.culture.name,
            allow_thousands_separators: compile.allow_thousands_separators,
            date_formats: compile.date_formats,
            case_sensitive_headers: compile.case_sensitive_headers,
            min_resemblance: compile.resolver.min_resemblance,
            max_edit_distance: compile.resolver.max_edit_distance,
            empty_policy: runtime.empty_policy,
            default_action: runtime.default_action,
            include_values: runtime.include_values,
            capture_timing: runtime.capture_timing,
            allow_generic_coercion: runtime.allow_generic_coercion,
            case_insensitive_enums: runtime.case_insensitive_enums,
            max_degree_of_parallelism: runtime.max_degree_of_parallelism,
        }
    }
}

impl PolicyConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse policy config")
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read policy config: {}", path.display()))?;
        Self::from_json_str(&text)
    }

    pub fn compile_options(&self) -> std::result::Result<CompileOptions, ConfigError> {
        let culture = Culture::from_name(&self.culture)
            .ok_or_else(|| ConfigError::UnknownCulture(self.culture.clone()))?;
        let options = CompileOptions {
            culture,
            allow_thousands_separators: self.allow_thousands_separators,
            date_formats: self.date_formats.clone(),
            case_sensitive_headers: self.case_sensitive_headers,
            resolver: ResolverOptions {
                min_resemblance: self.min_resemblance,
                max_edit_distance: self.max_edit_distance,
            },
        };
        options.validate()?;
        Ok(options)
    }

    pub fn runtime_options(&self) -> RuntimeOptions {
        RuntimeOptions {
            empty_policy: self.empty_policy,
            default_action: self.default_action,
            include_values: self.include_values,
            capture_timing: self.capture_timing,
            allow_generic_coercion: self.allow_generic_coercion,
            case_insensitive_enums: self.case_insensitive_enums,
            max_degree_of_parallelism: self.max_degree_of_parallelism,
            ..RuntimeOptions::default()
        }
    }
}
