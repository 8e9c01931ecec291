//! Row materialization
//!
//! A [`Materializer`] owns the plan cache and turns rows of raw values into
//! typed records in one of three modes:
//!
//! - [`Materializer::materialize`]: lazy, sequential iterator
//! - [`Materializer::materialize_parallel`]: scoped worker threads over a slice
//! - [`Materializer::materialize_stream`]: async stream with cancellation
//!
//! All modes share the per-row protocol of [`Plan::materialize_row`]: members
//! convert in plan order, a skipped row is dropped whole, and a skipped
//! member keeps its default value.

pub mod parallel;
pub mod sequential;
pub mod streaming;

pub use sequential::Rows;
pub use streaming::{RowStream, StreamStatus};

use crate::config::CompileOptions;
use crate::error::MaterializeError;
use crate::plan::{Plan, PlanCache, Record};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct Materializer {
    cache: Arc<PlanCache>,
}

impl Materializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share an existing plan cache, e.g. between services
    pub fn with_cache(cache: Arc<PlanCache>) -> Self {
        Materializer { cache }
    }

    pub fn cache(&self) -> &Arc<PlanCache> {
        &self.cache
    }

    /// Compiled plan for `T`, built on first use
    pub fn plan<T: Record>(&self, options: &CompileOptions) -> Result<Arc<Plan<T>>, MaterializeError> {
        self.cache.get_or_build::<T>(options)
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{people, Person, SCHEMA};
    use super::*;
    use crate::config::{ErrorAction, RuntimeOptions};
    use crate::convert::{MemorySink, Severity};
    use futures::StreamExt;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn test_materializers_can_share_a_cache() {
        let first = Materializer::new();
        let second = Materializer::with_cache(first.cache().clone());

        let a = first.plan::<Person>(&CompileOptions::default()).unwrap();
        let b = second.plan::<Person>(&CompileOptions::default()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(second.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_runtime_options_do_not_change_plan_identity() {
        let materializer = Materializer::new();
        let compile = CompileOptions::default();
        let rows = people(3);

        let strict = RuntimeOptions::default();
        let lenient = RuntimeOptions {
            default_action: ErrorAction::SkipRow,
            max_degree_of_parallelism: Some(2),
            ..RuntimeOptions::default()
        }
        .with_sink(Arc::new(MemorySink::new(Severity::Debug)));

        let first = materializer.plan::<Person>(&compile).unwrap();
        let sequential: Vec<Person> = materializer
            .materialize(&SCHEMA, rows.clone(), &compile, strict)
            .unwrap()
            .map(Result::unwrap)
            .collect();
        let parallel: Vec<Person> = materializer
            .materialize_parallel(&SCHEMA, &rows, &compile, lenient.clone())
            .unwrap();
        let streamed: Vec<Person> = materializer
            .materialize_stream(&SCHEMA, futures::stream::iter(rows), &compile, lenient, CancellationToken::new())
            .unwrap()
            .map(Result::unwrap)
            .collect()
            .await;

        assert_eq!(sequential, parallel);
        assert_eq!(sequential, streamed);
        assert_eq!(materializer.cache().len(), 1);
        assert!(Arc::ptr_eq(&first, &materializer.plan::<Person>(&compile).unwrap()));
    }
}
