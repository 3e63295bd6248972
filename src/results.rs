use std::collections::HashMap;
use std::sync::Arc;

use crate::types::ColumnValue;

/// A row read from a result set.
///
/// Column names are shared across all rows of one result set.
#[derive(Debug, Clone)]
pub struct DbRow {
    /// The column names for this row (shared across all rows in a result set)
    pub column_names: Arc<Vec<String>>,
    /// The values for this row
    pub values: Vec<ColumnValue>,
    // Internal cache for faster column lookups (to avoid repeated string comparisons)
    #[doc(hidden)]
    pub(crate) column_index_cache: Arc<HashMap<String, usize>>,
}

impl DbRow {
    #[must_use]
    pub fn new(column_names: Arc<Vec<String>>, values: Vec<ColumnValue>) -> Self {
        let cache = Arc::new(
            column_names
                .iter()
                .enumerate()
                .map(|(i, name)| (name.clone(), i))
                .collect::<HashMap<_, _>>(),
        );

        Self {
            column_names,
            values,
            column_index_cache: cache,
        }
    }

    /// Build a row sharing the column metadata of an earlier one.
    #[must_use]
    pub fn with_shape_of(other: &DbRow, values: Vec<ColumnValue>) -> Self {
        Self {
            column_names: Arc::clone(&other.column_names),
            values,
            column_index_cache: Arc::clone(&other.column_index_cache),
        }
    }

    #[must_use]
    pub fn get_column_index(&self, column_name: &str) -> Option<usize> {
        if let Some(&idx) = self.column_index_cache.get(column_name) {
            return Some(idx);
        }

        self.column_names
            .iter()
            .position(|col| col.eq_ignore_ascii_case(column_name))
    }

    /// Get a value from the row by column name
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&ColumnValue> {
        self.get_column_index(column_name)
            .and_then(|idx| self.values.get(idx))
    }

    /// Get a value from the row by ordinal
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&ColumnValue> {
        self.values.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_by_name_and_ordinal() {
        let row = DbRow::new(
            Arc::new(vec!["Id".to_string(), "Name".to_string()]),
            vec![ColumnValue::Int32(3), ColumnValue::Text("ada".into())],
        );
        assert_eq!(row.get("Name"), Some(&ColumnValue::Text("ada".into())));
        assert_eq!(row.get("name"), Some(&ColumnValue::Text("ada".into())));
        assert_eq!(row.get_by_index(0), Some(&ColumnValue::Int32(3)));
        assert_eq!(row.get("missing"), None);

        let next = DbRow::with_shape_of(&row, vec![ColumnValue::Null, ColumnValue::Null]);
        assert!(Arc::ptr_eq(&row.column_names, &next.column_names));
        assert_eq!(next.len(), 2);
    }
}
