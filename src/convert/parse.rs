//! Culture-aware string parsing and non-string widening

use crate::config::{CompileOptions, Culture};
use crate::error::ConfigError;
use crate::types::{CellValue, TargetType};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Number, Value};
use uuid::Uuid;

static INTEGER_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[+-]?\d+$").unwrap());

static FLOAT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").unwrap()
});

const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M", "%I:%M:%S %p", "%I:%M %p"];

const TRUE_WORDS: &[&str] = &["true", "yes", "y", "1", "on"];
const FALSE_WORDS: &[&str] = &["false", "no", "n", "0", "off"];

/// Parsing rules fixed at plan compile time
#[derive(Debug, Clone)]
pub struct ParseSettings {
    culture: Culture,
    allow_thousands: bool,
    date_formats: Vec<String>,
    datetime_formats: Vec<String>,
    /// Validates digit grouping, e.g. `1,234,567.89` for the invariant culture
    grouped_number: Regex,
}

impl ParseSettings {
    pub fn from_options(options: &CompileOptions) -> Result<Self, ConfigError> {
        let culture = options.culture.clone();
        let (date_formats, datetime_formats) = if options.date_formats.is_empty() {
            (culture.date_formats.clone(), culture.datetime_formats.clone())
        } else {
            (options.date_formats.clone(), options.date_formats.clone())
        };

        let pattern = format!(
            r"^[+-]?\d{{1,3}}(?:{}\d{{3}})+(?:{}\d+)?$",
            regex::escape(&culture.group_separator.to_string()),
            regex::escape(&culture.decimal_separator.to_string()),
        );
        let grouped_number = Regex::new(&pattern)
            .map_err(|e| ConfigError::InvalidCompileOptions(format!("culture '{}': {}", culture.name, e)))?;

        Ok(ParseSettings {
            culture,
            allow_thousands: options.allow_thousands_separators,
            date_formats,
            datetime_formats,
            grouped_number,
        })
    }

    pub fn culture(&self) -> &Culture {
        &self.culture
    }

    /// Parse a string into the (non-nullable) target type
    pub fn parse_str(&self, text: &str, target: &TargetType, case_insensitive_enums: bool) -> Result<CellValue, String> {
        let trimmed = text.trim();
        match target {
            TargetType::String => Ok(CellValue::Str(text.to_string())),
            TargetType::Bool => parse_bool(trimmed),
            TargetType::Char => {
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(CellValue::Char(c)),
                    _ => Err(format!("expected exactly one character, got {} characters", text.chars().count())),
                }
            }
            TargetType::F32 | TargetType::F64 => self.parse_float(trimmed, target),
            TargetType::Guid => Uuid::parse_str(trimmed)
                .map(CellValue::Guid)
                .map_err(|e| e.to_string()),
            TargetType::Date => self.parse_date(trimmed).map(CellValue::Date),
            TargetType::DateTime => self.parse_datetime(trimmed).map(CellValue::DateTime),
            TargetType::Time => parse_time(trimmed).map(CellValue::Time),
            TargetType::Enum(spec) => {
                if let Some((name, discriminant)) = spec.by_name(trimmed, case_insensitive_enums) {
                    return Ok(CellValue::Enum { name: name.to_string(), discriminant });
                }
                trimmed
                    .parse::<i64>()
                    .ok()
                    .and_then(|d| spec.by_discriminant(d))
                    .map(|(name, discriminant)| CellValue::Enum { name: name.to_string(), discriminant })
                    .ok_or_else(|| format!("'{}' is not a variant of {}", trimmed, spec.name))
            }
            TargetType::Nullable(inner) => self.parse_str(text, inner, case_insensitive_enums),
            integer => self.parse_integer(trimmed, integer),
        }
    }

    /// Strip group separators and map the decimal separator to '.'
    fn normalize_number(&self, text: &str) -> Result<String, String> {
        let group = self.culture.group_separator;
        let decimal = self.culture.decimal_separator;

        let mut normalized = text.to_string();
        if text.contains(group) {
            if !self.allow_thousands {
                return Err(format!("group separator '{}' is not allowed", group));
            }
            if !self.grouped_number.is_match(text) {
                return Err(format!("misplaced group separator in '{}'", text));
            }
            normalized = text.replace(group, "");
        }

        if decimal != '.' {
            if normalized.contains('.') {
                return Err(format!("unexpected '.' for culture {}", self.culture.name));
            }
            normalized = normalized.replace(decimal, ".");
        }
        Ok(normalized)
    }

    fn parse_integer(&self, text: &str, target: &TargetType) -> Result<CellValue, String> {
        let normalized = self.normalize_number(text)?;
        if !INTEGER_REGEX.is_match(&normalized) {
            return Err(format!("'{}' is not an integer", text));
        }

        if let Some((min, max)) = target.signed_range() {
            let value = normalized.parse::<i64>().map_err(|e| e.to_string())?;
            if value < min || value > max {
                return Err(format!("{} is out of range for {}", value, target));
            }
            return Ok(CellValue::Int(value));
        }

        if let Some(max) = target.unsigned_max() {
            let value = normalized.parse::<u64>().map_err(|e| e.to_string())?;
            if value > max {
                return Err(format!("{} is out of range for {}", value, target));
            }
            return Ok(CellValue::UInt(value));
        }

        Err(format!("{} is not an integer type", target))
    }

    fn parse_float(&self, text: &str, target: &TargetType) -> Result<CellValue, String> {
        let special = match text.to_ascii_lowercase().as_str() {
            "nan" => Some(f64::NAN),
            "infinity" | "inf" | "+infinity" | "+inf" => Some(f64::INFINITY),
            "-infinity" | "-inf" => Some(f64::NEG_INFINITY),
            _ => None,
        };
        if let Some(value) = special {
            return Ok(CellValue::Float(value));
        }

        let normalized = self.normalize_number(text)?;
        if !FLOAT_REGEX.is_match(&normalized) {
            return Err(format!("'{}' is not a number", text));
        }

        if *target == TargetType::F32 {
            let value = normalized.parse::<f32>().map_err(|e| e.to_string())?;
            if value.is_infinite() {
                return Err(format!("{} is out of range for f32", text));
            }
            return Ok(CellValue::Float(f64::from(value)));
        }

        normalized
            .parse::<f64>()
            .map(CellValue::Float)
            .map_err(|e| e.to_string())
    }

    fn parse_date(&self, text: &str) -> Result<NaiveDate, String> {
        self.date_formats
            .iter()
            .find_map(|f| NaiveDate::parse_from_str(text, f).ok())
            .or_else(|| self.parse_datetime(text).ok().map(|dt| dt.date()))
            .ok_or_else(|| format!("'{}' does not match any date format", text))
    }

    fn parse_datetime(&self, text: &str) -> Result<NaiveDateTime, String> {
        if let Some(dt) = self
            .datetime_formats
            .iter()
            .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
        {
            return Ok(dt);
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
            return Ok(dt.naive_utc());
        }
        self.date_formats
            .iter()
            .find_map(|f| NaiveDate::parse_from_str(text, f).ok())
            .map(|d| d.and_time(NaiveTime::default()))
            .ok_or_else(|| format!("'{}' does not match any date-time format", text))
    }
}

fn parse_bool(text: &str) -> Result<CellValue, String> {
    let lower = text.to_ascii_lowercase();
    if TRUE_WORDS.contains(&lower.as_str()) {
        Ok(CellValue::Bool(true))
    } else if FALSE_WORDS.contains(&lower.as_str()) {
        Ok(CellValue::Bool(false))
    } else {
        Err(format!("'{}' is not a boolean", text))
    }
}

fn parse_time(text: &str) -> Result<NaiveTime, String> {
    TIME_FORMATS
        .iter()
        .find_map(|f| NaiveTime::parse_from_str(text, f).ok())
        .ok_or_else(|| format!("'{}' does not match any time format", text))
}

/// Fast path: the raw value already has the target's shape
pub fn direct(raw: &Value, target: &TargetType) -> Option<CellValue> {
    match (raw, target) {
        (Value::String(s), TargetType::String) => Some(CellValue::Str(s.clone())),
        (Value::Bool(b), TargetType::Bool) => Some(CellValue::Bool(*b)),
        (Value::Number(n), TargetType::I64) => n.as_i64().map(CellValue::Int),
        (Value::Number(n), TargetType::U64) => n.as_u64().map(CellValue::UInt),
        (Value::Number(n), TargetType::F64) if n.is_f64() => n.as_f64().map(CellValue::Float),
        _ => None,
    }
}

/// Numeric and enum widening for non-string values
pub fn widen(raw: &Value, target: &TargetType) -> Result<CellValue, String> {
    let Value::Number(n) = raw else {
        return Err(format!("no widening from {} to {}", value_kind(raw), target));
    };

    if let Some((min, max)) = target.signed_range() {
        return integral(n)
            .and_then(|v| i64::try_from(v).ok())
            .filter(|v| *v >= min && *v <= max)
            .map(CellValue::Int)
            .ok_or_else(|| format!("{} does not fit {}", n, target));
    }

    if let Some(max) = target.unsigned_max() {
        return integral(n)
            .and_then(|v| u64::try_from(v).ok())
            .filter(|v| *v <= max)
            .map(CellValue::UInt)
            .ok_or_else(|| format!("{} does not fit {}", n, target));
    }

    match target {
        TargetType::F64 => n.as_f64().map(CellValue::Float).ok_or_else(|| format!("{} is not finite", n)),
        TargetType::F32 => n
            .as_f64()
            .filter(|v| v.abs() <= f64::from(f32::MAX))
            .map(|v| CellValue::Float(f64::from(v as f32)))
            .ok_or_else(|| format!("{} does not fit f32", n)),
        TargetType::Enum(spec) => integral(n)
            .and_then(|v| i64::try_from(v).ok())
            .and_then(|d| spec.by_discriminant(d))
            .map(|(name, discriminant)| CellValue::Enum { name: name.to_string(), discriminant })
            .ok_or_else(|| format!("{} is not a discriminant of {}", n, spec.name)),
        other => Err(format!("no widening from number to {}", other)),
    }
}

/// Exact integral value of a JSON number, including integral floats
fn integral(n: &Number) -> Option<i128> {
    if let Some(i) = n.as_i64() {
        return Some(i128::from(i));
    }
    if let Some(u) = n.as_u64() {
        return Some(i128::from(u));
    }
    n.as_f64()
        .filter(|f| f.fract() == 0.0 && f.abs() < 1.8e19)
        .map(|f| f as i128)
}

/// Text used by the generic coercion fallback
pub fn stringify(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn value_kind(raw: &Value) -> &'static str {
    match raw {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
