//! SQL Server driver built on tiberius.
//!
//! - config: connection options and the connection factory
//! - connection: the `Connection` implementation over a tokio socket
//! - query: batch rendering, parameter binding and cell conversion

pub mod config;
pub mod connection;
pub mod query;

pub use config::{MssqlConnectionFactory, MssqlOptions, MssqlOptionsBuilder};
pub use connection::{MssqlClient, MssqlConnection};
pub use query::render_batch;
