//! Statement configuration and the execution engine shared by every shape.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::command::SqlCommand;
use crate::driver::{Connection, ConnectionFactory};
use crate::error::SqlPipeError;
use crate::handler::{
    Decision, ErrorHandlerBuilder, ErrorHandlerChain, FailureContext, FnErrorHandler,
    RetryConfig, default_retry_config,
};
use crate::modifier::{self, CommandModifier, ModifierChain, ValueProvider};
use crate::params::{ParameterBinding, ParameterSet};
use crate::types::{CommandType, ParamValue, SqlType};

/// Where a statement gets its connection from.
#[derive(Clone)]
pub enum ConnectionSource {
    /// A fresh connection per execution.
    Factory(Arc<dyn ConnectionFactory>),
    /// One caller-supplied connection; executions take turns using it.
    Shared(Arc<Mutex<Box<dyn Connection>>>),
}

impl fmt::Debug for ConnectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Factory(_) => f.debug_tuple("Factory").field(&"<factory>").finish(),
            Self::Shared(_) => f.debug_tuple("Shared").field(&"<connection>").finish(),
        }
    }
}

impl ConnectionSource {
    async fn acquire(&self) -> ConnectionLease {
        match self {
            Self::Factory(factory) => ConnectionLease::Owned(factory.create()),
            Self::Shared(conn) => ConnectionLease::Shared(Arc::clone(conn).lock_owned().await),
        }
    }
}

/// Exclusive access to a connection for one execution.
enum ConnectionLease {
    Owned(Box<dyn Connection>),
    Shared(OwnedMutexGuard<Box<dyn Connection>>),
}

impl Deref for ConnectionLease {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Owned(conn) => &**conn,
            Self::Shared(guard) => &***guard,
        }
    }
}

impl DerefMut for ConnectionLease {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            Self::Owned(conn) => &mut **conn,
            Self::Shared(guard) => &mut ***guard,
        }
    }
}

/// The part of an execution that differs between `exec`, `map` and `stream`.
#[async_trait]
pub(crate) trait ExecutionBody: Send {
    /// Run the command on an open connection.
    async fn run(
        &mut self,
        conn: &mut dyn Connection,
        command: &SqlCommand,
    ) -> Result<(), SqlPipeError>;

    /// Rows that already reached the caller; retries are off once this is non-zero.
    fn rows_delivered(&self) -> u64;
}

/// How an execution ended once the error chain had its say.
#[derive(Debug)]
pub(crate) enum Outcome {
    Completed,
    /// A handler claimed the error and swallowed it.
    Handled(SqlPipeError),
    /// No handler claimed the error.
    Unclaimed(SqlPipeError),
    /// A handler claimed the error and returned this one.
    Rethrown(SqlPipeError),
}

impl Outcome {
    pub(crate) fn into_result(self) -> Result<(), SqlPipeError> {
        match self {
            Outcome::Completed | Outcome::Handled(_) => Ok(()),
            Outcome::Unclaimed(err) | Outcome::Rethrown(err) => Err(err),
        }
    }
}

/// A configured SQL command ready to run as a command, a row mapper or a stream.
///
/// Configuration is read when a call starts; executions only need `&self`, so one
/// statement can serve many concurrent requests when built on a connection factory.
///
/// ```rust,no_run
/// use sql_pipe::prelude::*;
///
/// # async fn demo(factory: MssqlConnectionFactory, response: &mut Vec<u8>) -> Result<(), SqlPipeError> {
/// let statement = Statement::new(factory)
///     .sql("SELECT * FROM Orders WHERE CustomerId = @id FOR JSON PATH")
///     .param("id", SqlType::Int, 42)
///     .add_rls("TenantId", || Some("contoso".to_string()));
///
/// let options = StreamOptions::new().default_text("[]");
/// statement.stream(response, &options).await?;
/// # Ok(()) }
/// ```
#[derive(Clone)]
pub struct Statement {
    source: Option<ConnectionSource>,
    text: Option<String>,
    command_type: CommandType,
    params: ParameterSet,
    modifiers: ModifierChain,
    handlers: ErrorHandlerChain,
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("source", &self.source)
            .field("text", &self.text)
            .field("command_type", &self.command_type)
            .field("params", &self.params)
            .field("modifiers", &self.modifiers)
            .field("handlers", &self.handlers)
            .finish()
    }
}

impl Default for Statement {
    fn default() -> Self {
        Self::unbound()
    }
}

impl Statement {
    /// A statement that opens a fresh connection from `factory` for every call.
    #[must_use]
    pub fn new(factory: impl ConnectionFactory + 'static) -> Self {
        Self::unbound().connection_source(ConnectionSource::Factory(Arc::new(factory)))
    }

    /// A statement bound to one caller-supplied connection.
    #[must_use]
    pub fn with_connection(conn: impl Connection + 'static) -> Self {
        Self::unbound().connection_source(ConnectionSource::Shared(Arc::new(Mutex::new(
            Box::new(conn),
        ))))
    }

    /// A statement with no connection yet. Executing it fails until one is set.
    #[must_use]
    pub fn unbound() -> Self {
        Self {
            source: None,
            text: None,
            command_type: CommandType::Text,
            params: ParameterSet::new(),
            modifiers: ModifierChain::new(),
            handlers: ErrorHandlerChain::new(default_retry_config()),
        }
    }

    #[must_use]
    pub fn connection_source(mut self, source: ConnectionSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the SQL batch to run.
    #[must_use]
    pub fn sql(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self.command_type = CommandType::Text;
        self
    }

    /// Take text, type and parameters from a prepared command.
    #[must_use]
    pub fn sql_command(mut self, command: SqlCommand) -> Self {
        self.text = Some(command.command_text().to_string());
        self.command_type = command.command_type();
        self.params = command.params().clone();
        self
    }

    /// Call a stored procedure by name.
    #[must_use]
    pub fn proc(mut self, name: impl Into<String>) -> Self {
        self.text = Some(name.into());
        self.command_type = CommandType::StoredProcedure;
        self
    }

    /// Bind a parameter; text sizes are derived from the value.
    #[must_use]
    pub fn param(
        mut self,
        name: impl AsRef<str>,
        sql_type: SqlType,
        value: impl Into<ParamValue>,
    ) -> Self {
        self.params
            .add(ParameterBinding::new(name, sql_type, value, None));
        self
    }

    /// Bind a parameter with an explicit size (`SIZE_MAX` for `MAX`).
    #[must_use]
    pub fn param_sized(
        mut self,
        name: impl AsRef<str>,
        sql_type: SqlType,
        value: impl Into<ParamValue>,
        size: i32,
    ) -> Self {
        self.params
            .add(ParameterBinding::new(name, sql_type, value, Some(size)));
        self
    }

    /// Append a command modifier. Earlier modifiers are kept and run first.
    #[must_use]
    pub fn add_modifier(mut self, modifier: CommandModifier) -> Self {
        self.modifiers.push(modifier);
        self
    }

    /// Set a row-level security key in the session context for every execution.
    #[must_use]
    pub fn add_rls<F>(self, key: impl Into<String>, value: F) -> Self
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        let provider: ValueProvider = Arc::new(value);
        self.add_modifier(modifier::rls(key, provider))
    }

    #[must_use]
    pub fn add_context_variable<F>(self, key: impl Into<String>, value: F, read_only: bool) -> Self
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        let provider: ValueProvider = Arc::new(value);
        self.add_modifier(modifier::context_variable(key, provider, read_only))
    }

    /// Append a handler builder to the error chain.
    #[must_use]
    pub fn add_error_handler_builder(mut self, builder: impl ErrorHandlerBuilder + 'static) -> Self {
        self.handlers.push(Arc::new(builder));
        self
    }

    /// Swallow failures after passing them to `handler`.
    #[must_use]
    pub fn on_error<F>(self, handler: F) -> Self
    where
        F: Fn(&SqlPipeError) + Send + Sync + 'static,
    {
        self.add_error_handler_builder(FnErrorHandler::new(handler))
    }

    /// Replace the retry policy captured at construction.
    #[must_use]
    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.handlers.set_retry_config(config);
        self
    }

    #[must_use]
    pub fn retry_policy(&self) -> &RetryConfig {
        self.handlers.retry_config()
    }

    #[must_use]
    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    /// Execute the command, discarding any rows.
    ///
    /// # Errors
    /// Returns `InvalidConfiguration` before any I/O when SQL text or connection is missing,
    /// and any execution error no handler swallowed.
    pub async fn exec(&self) -> Result<(), SqlPipeError> {
        let mut body = NonQuery;
        self.execute(&mut body).await?.into_result()
    }

    fn build_command(&self) -> Result<SqlCommand, SqlPipeError> {
        let text = self
            .text
            .as_deref()
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| {
                SqlPipeError::InvalidConfiguration("SQL command text is not set".to_string())
            })?;

        let mut command = match self.command_type {
            CommandType::Text => SqlCommand::text(text),
            CommandType::StoredProcedure => SqlCommand::procedure(text),
        };
        for binding in &self.params {
            command.params_mut().add(binding.clone());
        }
        Ok(command)
    }

    /// Run `body` with modifiers, error chain and guaranteed close.
    pub(crate) async fn execute<B: ExecutionBody>(
        &self,
        body: &mut B,
    ) -> Result<Outcome, SqlPipeError> {
        let command = self.build_command()?;
        let source = self.source.as_ref().ok_or_else(|| {
            SqlPipeError::InvalidConfiguration("connection is not set".to_string())
        })?;

        let command = match self.modifiers.apply(command.clone()) {
            Ok(modified) => modified,
            Err(err) => return Ok(self.settle(&command, err)),
        };

        let mut conn = source.acquire().await;
        let outcome = self.drive(&mut *conn, &command, body).await;
        if let Err(err) = conn.close().await {
            tracing::warn!(error = %err, "failed to close connection");
        } else {
            tracing::debug!("connection closed");
        }
        outcome
    }

    async fn drive<B: ExecutionBody>(
        &self,
        conn: &mut dyn Connection,
        command: &SqlCommand,
        body: &mut B,
    ) -> Result<Outcome, SqlPipeError> {
        let mut attempt = 0;
        loop {
            tracing::debug!(sql = command.command_text(), attempt, "executing statement");
            let result = match conn.open().await {
                Ok(()) => body.run(conn, command).await,
                Err(err) => Err(err),
            };

            let error = match result {
                Ok(()) => return Ok(Outcome::Completed),
                Err(err) if err.bypasses_handlers() => return Err(err),
                Err(err) => err,
            };

            let failure = FailureContext {
                command,
                error: &error,
                attempt,
                rows_delivered: body.rows_delivered(),
            };
            match self.handlers.dispatch(&failure) {
                Decision::Retry(delay) => {
                    attempt += 1;
                    tracing::warn!(
                        error = %error,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "retrying statement"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Decision::Handled => return Ok(Outcome::Handled(error)),
                Decision::Rethrow(err) => return Ok(Outcome::Rethrown(err)),
                Decision::Unclaimed => return Ok(Outcome::Unclaimed(error)),
            }
        }
    }

    /// Route an error that happened before anything was executed.
    fn settle(&self, command: &SqlCommand, error: SqlPipeError) -> Outcome {
        let failure = FailureContext {
            command,
            error: &error,
            attempt: 0,
            rows_delivered: 0,
        };
        match self.handlers.dispatch(&failure) {
            Decision::Handled => Outcome::Handled(error),
            Decision::Rethrow(err) => Outcome::Rethrown(err),
            // nothing ran, so there is nothing to retry
            Decision::Retry(_) | Decision::Unclaimed => Outcome::Unclaimed(error),
        }
    }
}

struct NonQuery;

#[async_trait]
impl ExecutionBody for NonQuery {
    async fn run(
        &mut self,
        conn: &mut dyn Connection,
        command: &SqlCommand,
    ) -> Result<(), SqlPipeError> {
        let affected = conn.execute_non_query(command).await?;
        tracing::debug!(affected, "command executed");
        Ok(())
    }

    fn rows_delivered(&self) -> u64 {
        0
    }
}
