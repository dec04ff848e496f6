//! In-memory data flowing between steps.
//!
//! A [`Table`] is a minimal columnar value: named columns of JSON cells.
//! The core never inspects cell contents; components agree on their own
//! conventions.

use std::collections::BTreeMap;

use serde_json::Value;

/// A columnar table. All columns hold the same number of rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// An empty table with the given column names.
    #[must_use]
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table from column names and row-major data.
    ///
    /// # Errors
    ///
    /// Returns an error message when a row's width does not match the
    /// column count.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self, String> {
        let mut table = Self::new(columns);
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    /// Append one row.
    ///
    /// # Errors
    ///
    /// Returns an error message when the row width does not match the
    /// column count.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), String> {
        if row.len() != self.columns.len() {
            return Err(format!(
                "row has {} cells, table has {} columns",
                row.len(),
                self.columns.len()
            ));
        }
        self.rows.push(row);
        Ok(())
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    /// Index of a column by name.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row-major view of the data.
    #[must_use]
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// A new table keeping only the rows the predicate accepts.
    #[must_use]
    pub fn filter_rows<F: FnMut(&[Value]) -> bool>(&self, mut keep: F) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .filter(|row| keep(row))
                .cloned()
                .collect(),
        }
    }
}

/// The unit flowing between steps in one pipeline invocation. Produced by
/// exactly one step, consumed downstream, never persisted.
#[derive(Debug, Clone, Default)]
pub struct DataPacket {
    pub data: Table,
    pub metadata: BTreeMap<String, String>,
}

impl DataPacket {
    #[must_use]
    pub fn new(data: Table) -> Self {
        Self {
            data,
            metadata: BTreeMap::new(),
        }
    }

    /// Attach a metadata entry, builder style.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Read a metadata entry.
    #[must_use]
    pub fn get_metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}
