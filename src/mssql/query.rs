use std::fmt::Write;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use tiberius::{ColumnData, FromSql, Query};

use crate::command::SqlCommand;
use crate::error::SqlPipeError;
use crate::results::DbRow;
use crate::types::{ColumnValue, CommandType, ParamValue, SqlType};

/// Render a command as one batch.
///
/// tiberius binds positionally as `@P1..@Pn`, so every named binding is declared with
/// its own type and size and initialised from its positional slot before the text runs.
#[must_use]
pub fn render_batch(command: &SqlCommand) -> String {
    let mut batch = String::new();
    for (idx, binding) in command.params().iter().enumerate() {
        let _ = writeln!(
            batch,
            "DECLARE {} {} = @P{};",
            binding.name(),
            binding.declaration(),
            idx + 1
        );
    }

    match command.command_type() {
        CommandType::Text => batch.push_str(command.command_text()),
        CommandType::StoredProcedure => {
            batch.push_str("EXEC ");
            batch.push_str(command.command_text());
            let args: Vec<String> = command
                .params()
                .iter()
                .map(|binding| format!("{name} = {name}", name = binding.name()))
                .collect();
            if !args.is_empty() {
                batch.push(' ');
                batch.push_str(&args.join(", "));
            }
            batch.push(';');
        }
    }
    batch
}

/// Render and bind a command for execution.
pub(crate) fn bind_query(command: &SqlCommand) -> Query<'static> {
    let mut query = Query::new(render_batch(command));
    for binding in command.params() {
        match binding.value() {
            ParamValue::Int(i) => query.bind(*i),
            ParamValue::Float(f) => query.bind(*f),
            ParamValue::Text(s) => query.bind(s.clone()),
            ParamValue::Bool(b) => query.bind(*b),
            ParamValue::Timestamp(dt) => query.bind(*dt),
            ParamValue::Null => query.bind(typed_null(binding.sql_type())),
            ParamValue::Json(value) => query.bind(value.to_string()),
            ParamValue::Blob(bytes) => query.bind(bytes.clone()),
        }
    }
    query
}

/// A null carrying the declared type, so the server never has to convert an
/// `NVARCHAR` null into a type it cannot implicitly convert to.
fn typed_null(sql_type: SqlType) -> ColumnData<'static> {
    match sql_type {
        SqlType::NVarChar | SqlType::VarChar | SqlType::NChar | SqlType::Char => {
            ColumnData::String(None)
        }
        SqlType::TinyInt => ColumnData::U8(None),
        SqlType::SmallInt => ColumnData::I16(None),
        SqlType::Int => ColumnData::I32(None),
        SqlType::BigInt => ColumnData::I64(None),
        SqlType::Bit => ColumnData::Bit(None),
        SqlType::Real => ColumnData::F32(None),
        SqlType::Float => ColumnData::F64(None),
        SqlType::Decimal { .. } => ColumnData::Numeric(None),
        SqlType::DateTime => ColumnData::DateTime(None),
        SqlType::DateTime2 => ColumnData::DateTime2(None),
        SqlType::Date => ColumnData::Date(None),
        SqlType::Time => ColumnData::Time(None),
        SqlType::UniqueIdentifier => ColumnData::Guid(None),
        SqlType::VarBinary => ColumnData::Binary(None),
        SqlType::Xml => ColumnData::Xml(None),
    }
}

/// Convert a tiberius row. `shape` carries the column names of the current result set
/// so rows share them instead of rebuilding the lookup cache per row.
pub(crate) fn convert_row(
    row: tiberius::Row,
    shape: &mut Option<DbRow>,
) -> Result<DbRow, SqlPipeError> {
    let same_shape = shape.as_ref().is_some_and(|s| {
        s.column_names
            .iter()
            .map(String::as_str)
            .eq(row.columns().iter().map(tiberius::Column::name))
    });
    if !same_shape {
        let names: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
        *shape = Some(DbRow::new(Arc::new(names), Vec::new()));
    }

    let values = row
        .into_iter()
        .map(convert_cell)
        .collect::<Result<Vec<_>, _>>()?;
    match shape {
        Some(template) => Ok(DbRow::with_shape_of(template, values)),
        None => Err(SqlPipeError::Other("row arrived without column metadata".to_string())),
    }
}

fn temporal<T>(
    data: &ColumnData<'static>,
    wrap: fn(T) -> ColumnValue,
) -> Result<ColumnValue, SqlPipeError>
where
    T: for<'a> FromSql<'a>,
{
    Ok(T::from_sql(data)?.map_or(ColumnValue::Null, wrap))
}

fn convert_cell(data: ColumnData<'static>) -> Result<ColumnValue, SqlPipeError> {
    let value = match data {
        ColumnData::U8(v) => v.map_or(ColumnValue::Null, ColumnValue::Byte),
        ColumnData::I16(v) => v.map_or(ColumnValue::Null, ColumnValue::Int16),
        ColumnData::I32(v) => v.map_or(ColumnValue::Null, ColumnValue::Int32),
        ColumnData::I64(v) => v.map_or(ColumnValue::Null, ColumnValue::Int64),
        ColumnData::F32(v) => v.map_or(ColumnValue::Null, ColumnValue::Single),
        ColumnData::F64(v) => v.map_or(ColumnValue::Null, ColumnValue::Double),
        ColumnData::Bit(v) => v.map_or(ColumnValue::Null, ColumnValue::Bool),
        ColumnData::String(v) => v.map_or(ColumnValue::Null, |s| {
            ColumnValue::Text(s.into_owned())
        }),
        ColumnData::Guid(v) => v.map_or(ColumnValue::Null, |g| ColumnValue::Guid(g.to_string())),
        ColumnData::Binary(v) => v.map_or(ColumnValue::Null, |b| {
            ColumnValue::Binary(b.into_owned())
        }),
        ColumnData::Numeric(v) => v.map_or(ColumnValue::Null, |n| {
            ColumnValue::Decimal(n.to_string())
        }),
        ColumnData::Xml(v) => v.map_or(ColumnValue::Null, |x| {
            ColumnValue::Xml(x.into_owned().into_string())
        }),
        ColumnData::Date(_) => temporal::<NaiveDate>(&data, ColumnValue::Date)?,
        ColumnData::Time(_) => temporal::<NaiveTime>(&data, ColumnValue::Time)?,
        ColumnData::DateTimeOffset(_) => {
            temporal::<DateTime<FixedOffset>>(&data, ColumnValue::DateTimeOffset)?
        }
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            temporal::<NaiveDateTime>(&data, ColumnValue::DateTime)?
        }
    };
    Ok(value)
}
