//! # Anvil - Typed Record Materialization
//!
//! Turns rows of loosely typed values (`serde_json::Value`) under a column
//! schema into strongly typed Rust records.
//!
//! ## Modules
//!
//! - **schema**: fuzzy resolution of input column names onto record members
//! - **convert**: strategy-based value conversion, error resolution and diagnostics
//! - **plan**: per-type compiled plans and the plan cache
//! - **materialize**: sequential, parallel and streaming row materialization
//!
//! ## Quick Start
//!
//! ```rust
//! use anvil::plan::{ModelBuilder, Record};
//! use anvil::{CompileOptions, ErrorAction, Materializer, RuntimeOptions};
//! use serde_json::json;
//!
//! #[derive(Debug, Default)]
//! struct Person {
//!     id: i64,
//!     full_name: String,
//!     age: i32,
//! }
//!
//! impl Record for Person {
//!     fn describe(model: &mut ModelBuilder<Self>) {
//!         model.member("Id", |p: &mut Person, v| p.id = v);
//!         model.member("FullName", |p: &mut Person, v| p.full_name = v);
//!         model.member("Age", |p: &mut Person, v| p.age = v);
//!     }
//! }
//!
//! # fn main() -> anyhow::Result<()> {
//! let rows = vec![
//!     vec![json!("1"), json!("Alice Liddell"), json!("30")],
//!     vec![json!("2"), json!("Bob Marley"), json!("thirty")],
//! ];
//!
//! let materializer = Materializer::new();
//! let runtime = RuntimeOptions::default().with_default_action(ErrorAction::UseDefault);
//! let people: Vec<Person> = materializer
//!     .materialize(&["id", "full_name", "age"], rows, &CompileOptions::default(), runtime)?
//!     .collect::<Result<_, _>>()?;
//!
//! assert_eq!(people[1].age, 0);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod convert;
pub mod error;
pub mod logging;
pub mod materialize;
pub mod plan;
pub mod schema;
pub mod types;

// Re-export commonly used types for convenience
pub use config::{CompileOptions, Culture, EmptyValuePolicy, ErrorAction, PolicyConfig, RuntimeOptions};
pub use convert::{DiagnosticEvent, DiagnosticSink, ErrorContext, MemorySink, Severity, Strategy};
pub use error::{ConfigError, MaterializeError};
pub use materialize::{Materializer, RowStream, Rows, StreamStatus};
pub use plan::{ModelBuilder, Plan, PlanCache, Record};
pub use schema::{NameResolver, ResolverOptions};
pub use types::{CellEnum, CellValue, ConversionOutcome, FromCell, Row, TargetType};
