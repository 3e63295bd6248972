//! Boundary to the underlying database driver.
//!
//! The engine only needs open / execute / read-row / close; everything else (pooling,
//! wire protocol, authentication) stays inside the driver.

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::command::SqlCommand;
use crate::error::SqlPipeError;
use crate::results::DbRow;

/// Rows produced by a reader. Finite and not restartable; dropping it closes the reader.
pub type RowStream<'a> = BoxStream<'a, Result<DbRow, SqlPipeError>>;

/// A single physical connection.
#[async_trait]
pub trait Connection: Send {
    /// Open the connection. Opening an already-open connection is a no-op.
    async fn open(&mut self) -> Result<(), SqlPipeError>;

    /// Execute a command that returns no rows.
    async fn execute_non_query(&mut self, command: &SqlCommand) -> Result<u64, SqlPipeError>;

    /// Execute a command and read its first result set.
    async fn execute_reader<'a>(
        &'a mut self,
        command: &'a SqlCommand,
    ) -> Result<RowStream<'a>, SqlPipeError>;

    /// Close the connection. Closing a closed connection is a no-op.
    async fn close(&mut self) -> Result<(), SqlPipeError>;

    fn is_open(&self) -> bool;
}

/// Produces a fresh, unopened connection for every execution.
pub trait ConnectionFactory: Send + Sync {
    fn create(&self) -> Box<dyn Connection>;
}

impl<F> ConnectionFactory for F
where
    F: Fn() -> Box<dyn Connection> + Send + Sync,
{
    fn create(&self) -> Box<dyn Connection> {
        self()
    }
}
