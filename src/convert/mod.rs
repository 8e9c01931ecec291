//! Runtime value conversion
//!
//! The engine picks a strategy by the shape of the raw value, falls back to
//! error resolution when every strategy fails, and reports each attempt to
//! an optional diagnostic sink.

pub mod context;
pub mod diagnostics;
pub mod engine;
pub mod parse;
pub mod resolution;

pub use context::{MemberContext, RowContext};
pub use diagnostics::{DiagnosticEvent, DiagnosticSink, MemorySink, Severity, Strategy};
pub use engine::ConversionEngine;
pub use parse::ParseSettings;
pub use resolution::ErrorContext;
