//! In-memory driver and helpers for exercising statements without a server.

pub mod scripted;

pub use scripted::{
    FailingWriter, ScriptedConnection, ScriptedConnectionFactory, ScriptedDriver, Step,
};

use std::sync::Arc;

use crate::results::DbRow;
use crate::types::ColumnValue;

/// A row with the given column names and values.
#[must_use]
pub fn row(names: &[&str], values: Vec<ColumnValue>) -> DbRow {
    let names = names.iter().map(|n| (*n).to_string()).collect();
    DbRow::new(Arc::new(names), values)
}

/// A single-column text row, as produced by `FOR JSON` chunks.
#[must_use]
pub fn text_row(text: &str) -> DbRow {
    row(&["json"], vec![ColumnValue::Text(text.to_string())])
}

#[must_use]
pub fn binary_row(bytes: &[u8]) -> DbRow {
    row(&["data"], vec![ColumnValue::Binary(bytes.to_vec())])
}

#[must_use]
pub fn int_row(value: i32) -> DbRow {
    row(&["value"], vec![ColumnValue::Int32(value)])
}

#[must_use]
pub fn null_row() -> DbRow {
    row(&["value"], vec![ColumnValue::Null])
}
