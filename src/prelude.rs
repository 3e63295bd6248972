//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::command::SqlCommand;
pub use crate::driver::{Connection, ConnectionFactory};
pub use crate::error::{DbError, SqlPipeError};
pub use crate::handler::{
    ErrorHandlerBuilder, FailureContext, FnErrorHandler, LogErrorHandler, Recovery,
    RethrowErrorHandler, RetryConfig,
};
pub use crate::mapper::RowHandler;
pub use crate::pipe::{DefaultOutput, OutputEncoding, StreamOptions};
pub use crate::results::DbRow;
pub use crate::statement::Statement;
pub use crate::types::{ColumnValue, ParamValue, SIZE_MAX, SqlType};

#[cfg(feature = "mssql")]
pub use crate::mssql::{MssqlConnectionFactory, MssqlOptions, MssqlOptionsBuilder};
