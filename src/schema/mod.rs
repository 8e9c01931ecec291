//! Column-name resolution
//!
//! Maps arbitrary input headers onto model member names before a plan's
//! schema mapping is built.

pub mod names;
pub mod resolver;

pub use names::{levenshtein, NameForms};
pub use resolver::{MatchPass, NameResolver, Resolution, ResolverOptions};
