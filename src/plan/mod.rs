//! Compiled materialization plans
//!
//! Member discovery runs once per `(type, compile options)`; the result is a
//! [`Plan`] of pre-built member routines, cached in a [`PlanCache`].

pub mod cache;
pub mod compiled;
pub mod model;

pub use cache::PlanCache;
pub use compiled::{CompiledMember, MappedColumn, MemberRoutine, Plan, SchemaMapping};
pub use model::{MemberHandle, ModelBuilder, Record};
