//! Async streaming materialization with cooperative cancellation

use super::Materializer;
use crate::config::{CompileOptions, RuntimeOptions};
use crate::error::MaterializeError;
use crate::plan::Record;
use crate::types::Row;
use async_stream::stream;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use tokio_util::sync::CancellationToken;

/// Lifecycle of a [`RowStream`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    Running,
    /// Source exhausted
    Completed,
    /// Stopped by the cancellation token; never set together with `Completed`
    Cancelled,
    /// Ended after yielding an error
    Failed,
}

#[derive(Clone)]
struct SharedStatus(Arc<Mutex<StreamStatus>>);

impl SharedStatus {
    fn get(&self) -> StreamStatus {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, status: StreamStatus) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }
}

/// Stream of materialized rows; see [`Materializer::materialize_stream`]
pub struct RowStream<T> {
    inner: BoxStream<'static, Result<T, MaterializeError>>,
    status: SharedStatus,
}

impl<T> RowStream<T> {
    pub fn status(&self) -> StreamStatus {
        self.status.get()
    }

    pub fn is_cancelled(&self) -> bool {
        self.status() == StreamStatus::Cancelled
    }

    pub fn is_completed(&self) -> bool {
        self.status() == StreamStatus::Completed
    }
}

impl<T> Stream for RowStream<T> {
    type Item = Result<T, MaterializeError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl Materializer {
    /// Materialize an async row source one item at a time.
    ///
    /// `cancel` is checked before each row and raced against the pending
    /// source item, so cancellation takes effect between rows. A cancelled
    /// stream ends without an error and reports [`StreamStatus::Cancelled`].
    pub fn materialize_stream<T, S, R>(
        &self,
        schema: &[S],
        rows: R,
        compile: &CompileOptions,
        runtime: RuntimeOptions,
        cancel: CancellationToken,
    ) -> Result<RowStream<T>, MaterializeError>
    where
        T: Record,
        S: AsRef<str>,
        R: Stream<Item = Row> + Send + 'static,
    {
        let plan = self.plan::<T>(compile)?;
        let mapping = plan.schema_mapping(schema);
        let status = SharedStatus(Arc::new(Mutex::new(StreamStatus::Running)));
        let shared = status.clone();

        let inner = stream! {
            let mut rows = Box::pin(rows);
            let mut row_index = 0usize;

            loop {
                if cancel.is_cancelled() {
                    shared.set(StreamStatus::Cancelled);
                    break;
                }

                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    row = rows.next() => Some(row),
                };
                let row = match next {
                    None => {
                        shared.set(StreamStatus::Cancelled);
                        break;
                    }
                    Some(None) => {
                        shared.set(StreamStatus::Completed);
                        break;
                    }
                    Some(Some(row)) => row,
                };

                let outcome = plan.materialize_row(&mapping, &row, row_index, &runtime, runtime.sink.as_deref());
                row_index += 1;
                match outcome {
                    Ok(Some(record)) => yield Ok(record),
                    Ok(None) => tracing::trace!(row_index = row_index - 1, "row skipped"),
                    Err(e) => {
                        shared.set(StreamStatus::Failed);
                        yield Err(e);
                        break;
                    }
                }
            }

            tracing::debug!(rows = row_index, status = ?shared.get(), "row stream ended");
        };

        Ok(RowStream {
            inner: inner.boxed(),
            status,
        })
    }
}
