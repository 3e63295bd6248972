use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream;
use tokio::io::AsyncWrite;

use crate::command::SqlCommand;
use crate::driver::{Connection, ConnectionFactory, RowStream};
use crate::error::SqlPipeError;
use crate::results::DbRow;

/// What the next execution (or open) does.
#[derive(Debug, Clone)]
pub enum Step {
    /// Return these rows (or their count for a non-query).
    Rows(Vec<DbRow>),
    /// Return these rows, then fail while reading.
    RowsThenFail(Vec<DbRow>, SqlPipeError),
    /// Fail the execution before any row.
    Fail(SqlPipeError),
    /// Report this many affected rows and no result set.
    Affected(u64),
    /// Fail the next `open`.
    OpenFail(SqlPipeError),
}

#[derive(Debug, Default)]
struct Script {
    steps: VecDeque<Step>,
    executed: Vec<SqlCommand>,
    created: usize,
    opens: usize,
    closes: usize,
}

/// A scripted database shared by every connection it creates.
///
/// Steps are consumed in order by whichever connection executes next; once the script
/// runs out, readers return no rows and commands affect nothing.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDriver {
    script: Arc<Mutex<Script>>,
}

impl ScriptedDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn then(self, step: Step) -> Self {
        self.lock().steps.push_back(step);
        self
    }

    #[must_use]
    pub fn then_rows(self, rows: Vec<DbRow>) -> Self {
        self.then(Step::Rows(rows))
    }

    #[must_use]
    pub fn then_fail(self, error: SqlPipeError) -> Self {
        self.then(Step::Fail(error))
    }

    #[must_use]
    pub fn factory(&self) -> ScriptedConnectionFactory {
        ScriptedConnectionFactory {
            driver: self.clone(),
        }
    }

    #[must_use]
    pub fn connection(&self) -> ScriptedConnection {
        self.lock().created += 1;
        ScriptedConnection {
            driver: self.clone(),
            open: false,
        }
    }

    /// Commands as they reached the connection, after modifiers ran.
    #[must_use]
    pub fn executed(&self) -> Vec<SqlCommand> {
        self.lock().executed.clone()
    }

    #[must_use]
    pub fn executions(&self) -> usize {
        self.lock().executed.len()
    }

    #[must_use]
    pub fn connections_created(&self) -> usize {
        self.lock().created
    }

    #[must_use]
    pub fn opens(&self) -> usize {
        self.lock().opens
    }

    #[must_use]
    pub fn closes(&self) -> usize {
        self.lock().closes
    }

    #[must_use]
    pub fn remaining_steps(&self) -> usize {
        self.lock().steps.len()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        match self.script.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn next_execution(&self, command: &SqlCommand) -> Option<Step> {
        let mut script = self.lock();
        script.executed.push(command.clone());
        script.steps.pop_front()
    }
}

#[derive(Debug, Clone)]
pub struct ScriptedConnectionFactory {
    driver: ScriptedDriver,
}

impl ConnectionFactory for ScriptedConnectionFactory {
    fn create(&self) -> Box<dyn Connection> {
        Box::new(self.driver.connection())
    }
}

#[derive(Debug)]
pub struct ScriptedConnection {
    driver: ScriptedDriver,
    open: bool,
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn open(&mut self) -> Result<(), SqlPipeError> {
        if self.open {
            return Ok(());
        }
        let mut script = self.driver.lock();
        if matches!(script.steps.front(), Some(Step::OpenFail(_))) {
            if let Some(Step::OpenFail(err)) = script.steps.pop_front() {
                return Err(err);
            }
        }
        script.opens += 1;
        self.open = true;
        Ok(())
    }

    async fn execute_non_query(&mut self, command: &SqlCommand) -> Result<u64, SqlPipeError> {
        match self.driver.next_execution(command) {
            None => Ok(0),
            Some(Step::Affected(n)) => Ok(n),
            Some(Step::Rows(rows)) => Ok(u64::try_from(rows.len()).unwrap_or(u64::MAX)),
            Some(Step::RowsThenFail(_, err) | Step::Fail(err) | Step::OpenFail(err)) => Err(err),
        }
    }

    async fn execute_reader<'a>(
        &'a mut self,
        command: &'a SqlCommand,
    ) -> Result<RowStream<'a>, SqlPipeError> {
        let items: Vec<Result<DbRow, SqlPipeError>> = match self.driver.next_execution(command) {
            None | Some(Step::Affected(_)) => Vec::new(),
            Some(Step::Rows(rows)) => rows.into_iter().map(Ok).collect(),
            Some(Step::RowsThenFail(rows, err)) => rows
                .into_iter()
                .map(Ok)
                .chain(std::iter::once(Err(err)))
                .collect(),
            Some(Step::Fail(err) | Step::OpenFail(err)) => return Err(err),
        };
        Ok(stream::iter(items).boxed())
    }

    async fn close(&mut self) -> Result<(), SqlPipeError> {
        if self.open {
            self.open = false;
            self.driver.lock().closes += 1;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// A sink whose writes always fail, like a client that hung up.
#[derive(Debug, Default)]
pub struct FailingWriter;

impl AsyncWrite for FailingWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "client disconnected",
        )))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
