use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A raw, loosely-typed row as produced by an upstream format reader
pub type Row = Vec<serde_json::Value>;

/// Result of one conversion or one member routine.
///
/// Skip decisions are ordinary return values, never errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionOutcome<T> {
    /// Conversion produced a value
    Value(T),
    /// Leave the member at its current value and continue with the row
    SkipProperty,
    /// Abandon the whole row
    SkipRow,
}

impl<T> ConversionOutcome<T> {
    pub fn is_skip_row(&self) -> bool {
        matches!(self, ConversionOutcome::SkipRow)
    }
}

/// A strongly-typed value produced by the conversion engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Char(char),
    Str(String),
    Guid(Uuid),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
    Enum { name: String, discriminant: i64 },
}

/// Static description of a user enum: its name and `(variant, discriminant)` table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumSpec {
    pub name: &'static str,
    pub variants: &'static [(&'static str, i64)],
}

impl EnumSpec {
    pub fn by_name(&self, name: &str, case_insensitive: bool) -> Option<(&'static str, i64)> {
        self.variants
            .iter()
            .find(|(variant, _)| {
                if case_insensitive {
                    variant.eq_ignore_ascii_case(name)
                } else {
                    *variant == name
                }
            })
            .copied()
    }

    pub fn by_discriminant(&self, discriminant: i64) -> Option<(&'static str, i64)> {
        self.variants
            .iter()
            .find(|(_, d)| *d == discriminant)
            .copied()
    }
}

/// The declared type of a model member
#[derive(Debug, Clone, PartialEq)]
pub enum TargetType {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Char,
    String,
    Guid,
    Date,
    DateTime,
    Time,
    Enum(EnumSpec),
    Nullable(Box<TargetType>),
}

impl TargetType {
    pub fn nullable(inner: TargetType) -> Self {
        match inner {
            TargetType::Nullable(_) => inner,
            other => TargetType::Nullable(Box::new(other)),
        }
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, TargetType::Nullable(_))
    }

    /// The type with any nullable wrapper removed
    pub fn underlying(&self) -> &TargetType {
        match self {
            TargetType::Nullable(inner) => inner.underlying(),
            other => other,
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self.underlying(), TargetType::String)
    }

    /// Inclusive range for signed integer targets
    pub fn signed_range(&self) -> Option<(i64, i64)> {
        match self {
            TargetType::I8 => Some((i8::MIN as i64, i8::MAX as i64)),
            TargetType::I16 => Some((i16::MIN as i64, i16::MAX as i64)),
            TargetType::I32 => Some((i32::MIN as i64, i32::MAX as i64)),
            TargetType::I64 => Some((i64::MIN, i64::MAX)),
            _ => None,
        }
    }

    /// Upper bound for unsigned integer targets
    pub fn unsigned_max(&self) -> Option<u64> {
        match self {
            TargetType::U8 => Some(u8::MAX as u64),
            TargetType::U16 => Some(u16::MAX as u64),
            TargetType::U32 => Some(u32::MAX as u64),
            TargetType::U64 => Some(u64::MAX),
            _ => None,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, TargetType::F32 | TargetType::F64)
    }

    /// Value assigned by the `UseDefault` action and the convert-to-default empty policy
    pub fn default_value(&self) -> CellValue {
        match self {
            TargetType::Bool => CellValue::Bool(false),
            TargetType::I8 | TargetType::I16 | TargetType::I32 | TargetType::I64 => CellValue::Int(0),
            TargetType::U8 | TargetType::U16 | TargetType::U32 | TargetType::U64 => CellValue::UInt(0),
            TargetType::F32 | TargetType::F64 => CellValue::Float(0.0),
            TargetType::Char => CellValue::Char('\0'),
            TargetType::String => CellValue::Str(String::new()),
            TargetType::Guid => CellValue::Guid(Uuid::nil()),
            TargetType::Date => CellValue::Date(NaiveDate::default()),
            TargetType::DateTime => CellValue::DateTime(NaiveDateTime::default()),
            TargetType::Time => CellValue::Time(NaiveTime::default()),
            TargetType::Enum(spec) => match spec.variants.first() {
                Some((name, discriminant)) => CellValue::Enum {
                    name: (*name).to_string(),
                    discriminant: *discriminant,
                },
                None => CellValue::Null,
            },
            TargetType::Nullable(_) => CellValue::Null,
        }
    }

    /// Whether a caller-supplied value (override or fallback) fits this target
    pub fn accepts(&self, cell: &CellValue) -> bool {
        match (self, cell) {
            (TargetType::Nullable(_), CellValue::Null) => true,
            (TargetType::Nullable(inner), other) => inner.accepts(other),
            (TargetType::Bool, CellValue::Bool(_)) => true,
            (TargetType::Char, CellValue::Char(_)) => true,
            (TargetType::String, CellValue::Str(_)) => true,
            (TargetType::Guid, CellValue::Guid(_)) => true,
            (TargetType::Date, CellValue::Date(_)) => true,
            (TargetType::DateTime, CellValue::DateTime(_)) => true,
            (TargetType::Time, CellValue::Time(_)) => true,
            (TargetType::F32 | TargetType::F64, CellValue::Float(_)) => true,
            (TargetType::Enum(spec), CellValue::Enum { discriminant, .. }) => {
                spec.by_discriminant(*discriminant).is_some()
            }
            (target, CellValue::Int(i)) => match (target.signed_range(), target.unsigned_max()) {
                (Some((min, max)), _) => *i >= min && *i <= max,
                (_, Some(max)) => *i >= 0 && (*i as u64) <= max,
                _ => false,
            },
            (target, CellValue::UInt(u)) => match (target.signed_range(), target.unsigned_max()) {
                (Some((_, max)), _) => *u <= max as u64,
                (_, Some(max)) => *u <= max,
                _ => false,
            },
            _ => false,
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TargetType::Bool => "bool",
            TargetType::I8 => "i8",
            TargetType::I16 => "i16",
            TargetType::I32 => "i32",
            TargetType::I64 => "i64",
            TargetType::U8 => "u8",
            TargetType::U16 => "u16",
            TargetType::U32 => "u32",
            TargetType::U64 => "u64",
            TargetType::F32 => "f32",
            TargetType::F64 => "f64",
            TargetType::Char => "char",
            TargetType::String => "String",
            TargetType::Guid => "Uuid",
            TargetType::Date => "NaiveDate",
            TargetType::DateTime => "NaiveDateTime",
            TargetType::Time => "NaiveTime",
            TargetType::Enum(spec) => spec.name,
            TargetType::Nullable(inner) => return write!(f, "Option<{}>", inner),
        };
        f.write_str(name)
    }
}

/// A Rust field type the engine can produce.
///
/// `from_cell` only sees values already converted for `target_type()`,
/// so a `None` here means a caller-supplied value of the wrong shape.
pub trait FromCell: Sized + Send + 'static {
    fn target_type() -> TargetType;
    fn from_cell(cell: CellValue) -> Option<Self>;
}

macro_rules! int_from_cell {
    ($($ty:ty => $target:ident),* $(,)?) => {
        $(
            impl FromCell for $ty {
                fn target_type() -> TargetType {
                    TargetType::$target
                }

                fn from_cell(cell: CellValue) -> Option<Self> {
                    match cell {
                        CellValue::Int(i) => <$ty>::try_from(i).ok(),
                        CellValue::UInt(u) => <$ty>::try_from(u).ok(),
                        _ => None,
                    }
                }
            }
        )*
    };
}

int_from_cell!(
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
);

impl FromCell for f64 {
    fn target_type() -> TargetType {
        TargetType::F64
    }

    fn from_cell(cell: CellValue) -> Option<Self> {
        match cell {
            CellValue::Float(f) => Some(f),
            _ => None,
        }
    }
}

impl FromCell for f32 {
    fn target_type() -> TargetType {
        TargetType::F32
    }

    fn from_cell(cell: CellValue) -> Option<Self> {
        match cell {
            CellValue::Float(f) => Some(f as f32),
            _ => None,
        }
    }
}

macro_rules! simple_from_cell {
    ($($ty:ty => $target:ident / $variant:ident),* $(,)?) => {
        $(
            impl FromCell for $ty {
                fn target_type() -> TargetType {
                    TargetType::$target
                }

                fn from_cell(cell: CellValue) -> Option<Self> {
                    match cell {
                        CellValue::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            }
        )*
    };
}

simple_from_cell!(
    bool => Bool / Bool,
    char => Char / Char,
    String => String / Str,
    Uuid => Guid / Guid,
    NaiveDate => Date / Date,
    NaiveDateTime => DateTime / DateTime,
    NaiveTime => Time / Time,
);

impl<V: FromCell> FromCell for Option<V> {
    fn target_type() -> TargetType {
        TargetType::nullable(V::target_type())
    }

    fn from_cell(cell: CellValue) -> Option<Self> {
        match cell {
            CellValue::Null => Some(None),
            other => V::from_cell(other).map(Some),
        }
    }
}

/// A user enum that can be targeted by conversion
pub trait CellEnum: Sized + Send + 'static {
    const NAME: &'static str;
    const VARIANTS: &'static [(&'static str, i64)];

    fn from_discriminant(discriminant: i64) -> Option<Self>;

    fn spec() -> EnumSpec {
        EnumSpec {
            name: Self::NAME,
            variants: Self::VARIANTS,
        }
    }
}

/// Implement [`FromCell`] for a type that implements [`CellEnum`]
#[macro_export]
macro_rules! cell_enum {
    ($ty:ty) => {
        impl $crate::types::FromCell for $ty {
            fn target_type() -> $crate::types::TargetType {
                $crate::types::TargetType::Enum(<$ty as $crate::types::CellEnum>::spec())
            }

            fn from_cell(cell: $crate::types::CellValue) -> Option<Self> {
                match cell {
                    $crate::types::CellValue::Enum { discriminant, .. } => {
                        <$ty as $crate::types::CellEnum>::from_discriminant(discriminant)
                    }
                    _ => None,
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum Status {
        Active,
        Retired,
    }

    impl CellEnum for Status {
        const NAME: &'static str = "Status";
        const VARIANTS: &'static [(&'static str, i64)] = &[("Active", 1), ("Retired", 2)];

        fn from_discriminant(discriminant: i64) -> Option<Self> {
            match discriminant {
                1 => Some(Status::Active),
                2 => Some(Status::Retired),
                _ => None,
            }
        }
    }

    crate::cell_enum!(Status);

    #[test]
    fn test_nullable_wrapping_is_flat() {
        let t = TargetType::nullable(TargetType::nullable(TargetType::I32));
        assert_eq!(t, TargetType::Nullable(Box::new(TargetType::I32)));
        assert_eq!(t.underlying(), &TargetType::I32);
        assert_eq!(t.to_string(), "Option<i32>");
    }

    #[test]
    fn test_default_values() {
        assert_eq!(TargetType::I32.default_value(), CellValue::Int(0));
        assert_eq!(TargetType::String.default_value(), CellValue::Str(String::new()));
        assert_eq!(
            TargetType::nullable(TargetType::String).default_value(),
            CellValue::Null
        );
        assert_eq!(
            Status::target_type().default_value(),
            CellValue::Enum { name: "Active".to_string(), discriminant: 1 }
        );
    }

    #[test]
    fn test_accepts_checks_integer_width() {
        assert!(TargetType::U8.accepts(&CellValue::Int(255)));
        assert!(!TargetType::U8.accepts(&CellValue::Int(256)));
        assert!(!TargetType::U8.accepts(&CellValue::Int(-1)));
        assert!(TargetType::I64.accepts(&CellValue::UInt(5)));
        assert!(!TargetType::I32.accepts(&CellValue::Str("5".to_string())));
        assert!(TargetType::nullable(TargetType::I32).accepts(&CellValue::Null));
    }

    #[test]
    fn test_from_cell_option_and_enum() {
        assert_eq!(<Option<i32>>::from_cell(CellValue::Null), Some(None));
        assert_eq!(<Option<i32>>::from_cell(CellValue::Int(7)), Some(Some(7)));
        assert_eq!(i8::from_cell(CellValue::Int(300)), None);
        assert_eq!(
            Status::from_cell(CellValue::Enum { name: "Retired".to_string(), discriminant: 2 }),
            Some(Status::Retired)
        );
    }

    #[test]
    fn test_enum_lookup() {
        let spec = Status::spec();
        assert_eq!(spec.by_name("active", true), Some(("Active", 1)));
        assert_eq!(spec.by_name("active", false), None);
        assert_eq!(spec.by_discriminant(2), Some(("Retired", 2)));
    }
}
