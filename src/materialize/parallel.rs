//! Parallel materialization over an in-memory slice
//!
//! Rows are split into contiguous chunks, one per scoped worker thread. Each
//! worker buffers its diagnostics privately; after the join, results are
//! merged in input order and buffered events are sorted by row index before
//! they reach the caller's sink.

use super::Materializer;
use crate::config::{CompileOptions, RuntimeOptions};
use crate::convert::{DiagnosticEvent, DiagnosticSink, MemorySink};
use crate::error::{ConfigError, MaterializeError};
use crate::plan::{Plan, Record, SchemaMapping};
use crate::types::Row;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

struct ChunkOutput<T> {
    records: Vec<Option<T>>,
    events: Vec<DiagnosticEvent>,
    failure: Option<(usize, MaterializeError)>,
}

impl Materializer {
    /// Materialize `rows` on a bounded pool of scoped threads.
    ///
    /// Output order matches input order with skipped rows removed. A
    /// configured sink must be concurrency safe. On failure the error of the
    /// lowest failing row index is returned, and only diagnostics up to that
    /// row are forwarded.
    pub fn materialize_parallel<T, S>(
        &self,
        schema: &[S],
        rows: &[Row],
        compile: &CompileOptions,
        runtime: RuntimeOptions,
    ) -> Result<Vec<T>, MaterializeError>
    where
        T: Record,
        S: AsRef<str>,
    {
        if runtime.sink.as_ref().is_some_and(|s| !s.is_concurrency_safe()) {
            return Err(ConfigError::UnsafeParallelSink.into());
        }

        let plan = self.plan::<T>(compile)?;
        let mapping = plan.schema_mapping(schema);
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let workers = runtime
            .max_degree_of_parallelism
            .or_else(|| thread::available_parallelism().ok().map(NonZeroUsize::get))
            .unwrap_or(1)
            .clamp(1, rows.len());
        let chunk_size = rows.len().div_ceil(workers);
        tracing::debug!(rows = rows.len(), workers, chunk_size, "starting parallel materialization");

        // Lowest failing row index seen so far; rows past it are not started
        let first_failure = AtomicUsize::new(usize::MAX);

        let outputs: Vec<ChunkOutput<T>> = thread::scope(|scope| {
            let handles: Vec<_> = rows
                .chunks(chunk_size)
                .enumerate()
                .map(|(chunk, slice)| {
                    let (plan, mapping, runtime, first_failure) = (&plan, &mapping, &runtime, &first_failure);
                    scope.spawn(move || run_chunk(plan, mapping, slice, chunk * chunk_size, runtime, first_failure))
                })
                .collect();

            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                .collect()
        });

        let mut records = Vec::with_capacity(rows.len());
        let mut events = Vec::new();
        let mut failure: Option<(usize, MaterializeError)> = None;
        for output in outputs {
            records.extend(output.records.into_iter().flatten());
            events.extend(output.events);
            if let Some((index, error)) = output.failure {
                if failure.as_ref().map_or(true, |(current, _)| index < *current) {
                    failure = Some((index, error));
                }
            }
        }

        if let Some(sink) = runtime.sink.as_deref() {
            let cutoff = failure.as_ref().map_or(usize::MAX, |(index, _)| *index);
            // stable, so each row keeps its attempt order
            events.sort_by_key(|e| e.row_index);
            events
                .into_iter()
                .filter(|e| e.row_index <= cutoff)
                .for_each(|e| sink.report(e));
        }

        match failure {
            Some((row_index, error)) => {
                tracing::debug!(row_index, "parallel materialization failed");
                Err(error)
            }
            None => Ok(records),
        }
    }
}

fn run_chunk<T: Record>(
    plan: &Plan<T>,
    mapping: &SchemaMapping,
    rows: &[Row],
    base_index: usize,
    options: &RuntimeOptions,
    first_failure: &AtomicUsize,
) -> ChunkOutput<T> {
    let buffer = options.sink.as_ref().map(|s| MemorySink::new(s.min_severity()));
    let sink = buffer.as_ref().map(|b| b as &dyn DiagnosticSink);

    let mut records = Vec::with_capacity(rows.len());
    let mut failure = None;
    for (offset, row) in rows.iter().enumerate() {
        let row_index = base_index + offset;
        if row_index > first_failure.load(Ordering::Relaxed) {
            break;
        }

        match plan.materialize_row(mapping, row, row_index, options, sink) {
            Ok(record) => records.push(record),
            Err(e) => {
                first_failure.fetch_min(row_index, Ordering::Relaxed);
                failure = Some((row_index, e));
                break;
            }
        }
    }

    ChunkOutput {
        records,
        events: buffer.map(|b| b.take()).unwrap_or_default(),
        failure,
    }
}
