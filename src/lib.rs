//! Async statement execution for SQL Server.
//!
//! A [`Statement`] runs one SQL command in one of three shapes: [`Statement::exec`]
//! for commands, [`Statement::map`] and friends for per-row callbacks, and
//! [`Statement::stream`] for writing server-generated JSON/XML straight into an
//! `AsyncWrite`. Failures go through an ordered chain of error-handler builders headed
//! by a retry policy; commands can be rewritten by modifiers before they run (for
//! example to set row-level-security keys in the session context).

pub mod command;
pub mod driver;
pub mod error;
pub mod handler;
pub mod mapper;
pub mod modifier;
pub mod params;
pub mod pipe;
pub mod prelude;
pub mod results;
pub mod statement;
pub mod types;

#[cfg(feature = "mssql")]
pub mod mssql;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use command::SqlCommand;
pub use driver::{Connection, ConnectionFactory, RowStream};
pub use error::{DbError, SqlPipeError};
pub use handler::{
    ErrorHandlerBuilder, FailureContext, Recovery, RetryConfig, default_retry_config,
    enable_delayed_retry, enable_immediate_retry, set_default_retry_config, set_retry_attempts,
};
pub use mapper::RowHandler;
pub use modifier::CommandModifier;
pub use params::{ParameterBinding, ParameterSet};
pub use pipe::{DefaultOutput, OutputEncoding, StreamOptions};
pub use results::DbRow;
pub use statement::{ConnectionSource, Statement};
pub use types::{ColumnValue, CommandType, ParamValue, SIZE_MAX, SqlType};
