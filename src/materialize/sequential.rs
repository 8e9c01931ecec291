//! Lazy single-pass materialization

use super::Materializer;
use crate::config::{CompileOptions, RuntimeOptions};
use crate::error::MaterializeError;
use crate::plan::{Plan, Record, SchemaMapping};
use crate::types::Row;
use std::iter::FusedIterator;
use std::sync::Arc;

/// Iterator over materialized rows.
///
/// Skipped rows are omitted. The first error is yielded once and ends the
/// sequence.
pub struct Rows<T, I> {
    plan: Arc<Plan<T>>,
    mapping: Arc<SchemaMapping>,
    rows: I,
    options: RuntimeOptions,
    next_index: usize,
    done: bool,
}

impl<T, I> Rows<T, I> {
    pub fn mapping(&self) -> &SchemaMapping {
        &self.mapping
    }

    /// Input rows consumed so far, skipped ones included
    pub fn rows_read(&self) -> usize {
        self.next_index
    }
}

impl<T: Record, I: Iterator<Item = Row>> Iterator for Rows<T, I> {
    type Item = Result<T, MaterializeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        for row in self.rows.by_ref() {
            let row_index = self.next_index;
            self.next_index += 1;

            let sink = self.options.sink.as_deref();
            match self.plan.materialize_row(&self.mapping, &row, row_index, &self.options, sink) {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => tracing::trace!(row_index, "row skipped"),
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }

        self.done = true;
        None
    }
}

impl<T: Record, I: Iterator<Item = Row>> FusedIterator for Rows<T, I> {}

impl Materializer {
    /// Materialize `rows` lazily, in input order.
    ///
    /// Configuration errors surface here, before any row is read.
    pub fn materialize<T, S, R>(
        &self,
        schema: &[S],
        rows: R,
        compile: &CompileOptions,
        runtime: RuntimeOptions,
    ) -> Result<Rows<T, R::IntoIter>, MaterializeError>
    where
        T: Record,
        S: AsRef<str>,
        R: IntoIterator<Item = Row>,
    {
        let plan = self.plan::<T>(compile)?;
        let mapping = plan.schema_mapping(schema);

        Ok(Rows {
            plan,
            mapping,
            rows: rows.into_iter(),
            options: runtime,
            next_index: 0,
            done: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EmptyValuePolicy, ErrorAction};
    use crate::convert::{MemorySink, Severity};
    use crate::materialize::fixtures::{people, Person, SCHEMA};
    use crate::plan::ModelBuilder;
    use serde_json::json;

    #[derive(Debug, Default, PartialEq)]
    struct Account {
        id: i64,
        full_name: String,
    }

    impl Record for Account {
        fn describe(model: &mut ModelBuilder<Self>) {
            model.member("Id", |a: &mut Account, v| a.id = v);
            model.member("FullName", |a: &mut Account, v| a.full_name = v);
        }
    }

    fn collect(rows: Vec<Row>, runtime: RuntimeOptions) -> Vec<Result<Person, MaterializeError>> {
        Materializer::new()
            .materialize::<Person, _, _>(&SCHEMA, rows, &CompileOptions::default(), runtime)
            .unwrap()
            .collect()
    }

    #[test]
    fn test_use_default_with_one_warning() {
        let sink = Arc::new(MemorySink::new(Severity::Warning));
        let runtime = RuntimeOptions::default()
            .with_default_action(ErrorAction::UseDefault)
            .with_sink(sink.clone());

        let rows = vec![vec![json!("1"), json!("Alice"), json!("thirty")]];
        let out: Vec<Person> = collect(rows, runtime).into_iter().map(Result::unwrap).collect();

        assert_eq!(out, vec![Person { id: 1, name: "Alice".to_string(), age: 0 }]);
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].severity, Severity::Warning);
        assert_eq!(events[0].member, "Age");
        assert_eq!(events[0].row_index, 0);
    }

    #[test]
    fn test_normalized_headers() {
        let rows = vec![vec![json!("42"), json!("Grace Hopper")]];
        let out: Vec<Account> = Materializer::new()
            .materialize(&["id", "full_name"], rows, &CompileOptions::default(), RuntimeOptions::default())
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(out, vec![Account { id: 42, full_name: "Grace Hopper".to_string() }]);
    }

    #[test]
    fn test_throw_on_empty_names_member() {
        let runtime = RuntimeOptions::default().with_empty_policy(EmptyValuePolicy::Error);
        let rows = vec![vec![json!("1"), json!(""), json!("30")]];

        let out = collect(rows, runtime);
        assert_eq!(out.len(), 1);
        let err = out.into_iter().next().unwrap().unwrap_err();
        assert_eq!(err.member(), Some("Name"));
        assert_eq!(err.row_index(), Some(0));
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_skip_row_keeps_prior_rows() {
        let mut rows = people(4);
        rows[2][2] = json!("unknown");
        let runtime = RuntimeOptions::default().with_default_action(ErrorAction::SkipRow);

        let ids: Vec<i32> = collect(rows, runtime).into_iter().map(|r| r.unwrap().id).collect();
        assert_eq!(ids, vec![0, 1, 3]);
    }

    #[test]
    fn test_first_error_ends_sequence() {
        let mut rows = people(5);
        rows[1][0] = json!("one");

        let mut iter = Materializer::new()
            .materialize::<Person, _, _>(&SCHEMA, rows, &CompileOptions::default(), RuntimeOptions::default())
            .unwrap();
        assert!(iter.next().unwrap().is_ok());
        assert!(iter.next().unwrap().is_err());
        assert!(iter.next().is_none());
        assert!(iter.next().is_none());
        assert_eq!(iter.rows_read(), 2);
    }

    #[test]
    fn test_rows_are_read_lazily() {
        let mut iter = Materializer::new()
            .materialize::<Person, _, _>(&SCHEMA, people(100), &CompileOptions::default(), RuntimeOptions::default())
            .unwrap();
        iter.next();
        assert_eq!(iter.rows_read(), 1);
    }

    #[test]
    fn test_unmapped_columns_are_ignored() {
        let rows = vec![vec![json!("5"), json!("ignored"), json!("Eve")]];
        let out: Vec<Person> = Materializer::new()
            .materialize(&["Id", "Shoe Size", "Name"], rows, &CompileOptions::default(), RuntimeOptions::default())
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(out, vec![Person { id: 5, name: "Eve".to_string(), age: 0 }]);
    }
}
