//! Row-callback execution.

use std::future::Future;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use futures_util::future::BoxFuture;

use crate::command::SqlCommand;
use crate::driver::Connection;
use crate::error::SqlPipeError;
use crate::results::DbRow;
use crate::statement::{ExecutionBody, Outcome, Statement};

pub type RowCallback<'a> = Box<dyn FnMut(&DbRow) -> Result<(), SqlPipeError> + Send + 'a>;
pub type RowCallbackWithError<'a> =
    Box<dyn FnMut(Option<&DbRow>, Option<&SqlPipeError>) -> Result<(), SqlPipeError> + Send + 'a>;
pub type AsyncRowCallback<'a> =
    Box<dyn FnMut(DbRow) -> BoxFuture<'a, Result<(), SqlPipeError>> + Send + 'a>;
pub type AsyncRowCallbackWithError<'a> = Box<
    dyn FnMut(Option<DbRow>, Option<SqlPipeError>) -> BoxFuture<'a, Result<(), SqlPipeError>>
        + Send
        + 'a,
>;

/// The per-row callback, in one of four shapes.
///
/// Callbacks that accept an error receive `(None, Some(err))` exactly once when the
/// execution fails, instead of the error being returned to the caller.
pub enum RowHandler<'a> {
    Sync(RowCallback<'a>),
    SyncWithError(RowCallbackWithError<'a>),
    Async(AsyncRowCallback<'a>),
    AsyncWithError(AsyncRowCallbackWithError<'a>),
}

impl<'a> RowHandler<'a> {
    pub fn sync<F>(f: F) -> Self
    where
        F: FnMut(&DbRow) -> Result<(), SqlPipeError> + Send + 'a,
    {
        RowHandler::Sync(Box::new(f))
    }

    pub fn sync_with_error<F>(f: F) -> Self
    where
        F: FnMut(Option<&DbRow>, Option<&SqlPipeError>) -> Result<(), SqlPipeError> + Send + 'a,
    {
        RowHandler::SyncWithError(Box::new(f))
    }

    pub fn asynchronous<F, Fut>(mut f: F) -> Self
    where
        F: FnMut(DbRow) -> Fut + Send + 'a,
        Fut: Future<Output = Result<(), SqlPipeError>> + Send + 'a,
    {
        RowHandler::Async(Box::new(move |row| Box::pin(f(row))))
    }

    pub fn asynchronous_with_error<F, Fut>(mut f: F) -> Self
    where
        F: FnMut(Option<DbRow>, Option<SqlPipeError>) -> Fut + Send + 'a,
        Fut: Future<Output = Result<(), SqlPipeError>> + Send + 'a,
    {
        RowHandler::AsyncWithError(Box::new(move |row, err| Box::pin(f(row, err))))
    }

    #[must_use]
    pub fn accepts_error(&self) -> bool {
        matches!(
            self,
            RowHandler::SyncWithError(_) | RowHandler::AsyncWithError(_)
        )
    }

    async fn on_row(&mut self, row: DbRow) -> Result<(), SqlPipeError> {
        match self {
            RowHandler::Sync(f) => f(&row),
            RowHandler::SyncWithError(f) => f(Some(&row), None),
            RowHandler::Async(f) => f(row).await,
            RowHandler::AsyncWithError(f) => f(Some(row), None).await,
        }
    }

    async fn on_error(&mut self, error: &SqlPipeError) -> Result<(), SqlPipeError> {
        match self {
            RowHandler::SyncWithError(f) => f(None, Some(error)),
            RowHandler::AsyncWithError(f) => f(None, Some(error.clone())).await,
            RowHandler::Sync(_) | RowHandler::Async(_) => Ok(()),
        }
    }
}

struct MapBody<'h> {
    handler: RowHandler<'h>,
    rows: u64,
    error_delivered: bool,
    /// Failure of the callback while it was being told about an error.
    escalated: Option<SqlPipeError>,
}

#[async_trait]
impl<'h> ExecutionBody for MapBody<'h> {
    async fn run(
        &mut self,
        conn: &mut dyn Connection,
        command: &SqlCommand,
    ) -> Result<(), SqlPipeError> {
        let mut rows = conn.execute_reader(command).await?;
        while let Some(row) = rows.try_next().await? {
            self.rows += 1;
            if let Err(err) = self.handler.on_row(row).await {
                if self.handler.accepts_error() {
                    self.error_delivered = true;
                    if let Err(escalated) = self.handler.on_error(&err).await {
                        self.escalated = Some(escalated);
                    }
                }
                return Err(err);
            }
        }
        tracing::debug!(rows = self.rows, "reader exhausted");
        Ok(())
    }

    fn rows_delivered(&self) -> u64 {
        self.rows
    }
}

impl Statement {
    /// Execute the query and pass every row to `handler`.
    ///
    /// # Errors
    /// Returns configuration errors, sink-independent execution errors no handler
    /// swallowed (for callbacks that do not accept errors), errors rethrown by a handler,
    /// and failures of an error-accepting callback while it was receiving an error.
    pub async fn map_rows(&self, handler: RowHandler<'_>) -> Result<(), SqlPipeError> {
        let mut body = MapBody {
            handler,
            rows: 0,
            error_delivered: false,
            escalated: None,
        };
        let outcome = self.execute(&mut body).await?;
        if let Some(escalated) = body.escalated.take() {
            return Err(escalated);
        }
        if !body.handler.accepts_error() {
            return outcome.into_result();
        }

        match outcome {
            Outcome::Completed => Ok(()),
            Outcome::Handled(err) | Outcome::Unclaimed(err) => {
                if !body.error_delivered {
                    body.handler.on_error(&err).await?;
                }
                Ok(())
            }
            Outcome::Rethrown(err) => {
                if !body.error_delivered {
                    body.handler.on_error(&err).await?;
                }
                Err(err)
            }
        }
    }

    /// Map rows with a synchronous callback.
    ///
    /// # Errors
    /// See [`Statement::map_rows`].
    pub async fn map<F>(&self, f: F) -> Result<(), SqlPipeError>
    where
        F: FnMut(&DbRow) -> Result<(), SqlPipeError> + Send,
    {
        self.map_rows(RowHandler::sync(f)).await
    }

    /// Map rows with a synchronous callback that also receives failures.
    ///
    /// # Errors
    /// See [`Statement::map_rows`].
    pub async fn map_with_error<F>(&self, f: F) -> Result<(), SqlPipeError>
    where
        F: FnMut(Option<&DbRow>, Option<&SqlPipeError>) -> Result<(), SqlPipeError> + Send,
    {
        self.map_rows(RowHandler::sync_with_error(f)).await
    }

    /// Map rows with an asynchronous callback.
    ///
    /// # Errors
    /// See [`Statement::map_rows`].
    pub async fn map_async<F, Fut>(&self, f: F) -> Result<(), SqlPipeError>
    where
        F: FnMut(DbRow) -> Fut + Send,
        Fut: Future<Output = Result<(), SqlPipeError>> + Send,
    {
        self.map_rows(RowHandler::asynchronous(f)).await
    }

    /// Map rows with an asynchronous callback that also receives failures.
    ///
    /// # Errors
    /// See [`Statement::map_rows`].
    pub async fn map_async_with_error<F, Fut>(&self, f: F) -> Result<(), SqlPipeError>
    where
        F: FnMut(Option<DbRow>, Option<SqlPipeError>) -> Fut + Send,
        Fut: Future<Output = Result<(), SqlPipeError>> + Send,
    {
        self.map_rows(RowHandler::asynchronous_with_error(f)).await
    }
}
