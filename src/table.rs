use crate::domain::{RawRecord, Value};
use crate::error::{EtlError, Result};

/// A named, column-ordered table of values. Every row has exactly one value
/// per column. Transform stages never mutate a table they were handed; they
/// return a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    name: String,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Builds a table from literal columns and rows. Short rows are padded
    /// with nulls, long rows truncated.
    pub fn from_rows(name: impl Into<String>, columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        let mut table = Self::new(name, columns.iter().map(|c| c.to_string()).collect());
        for row in rows {
            table.push_row(row);
        }
        table
    }

    /// Columns are the union of all record fields in first-seen order;
    /// fields a record lacks become null.
    pub fn from_records(name: impl Into<String>, records: &[RawRecord]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in records {
            for (column, _) in record.fields() {
                if !columns.iter().any(|c| c == column) {
                    columns.push(column.to_string());
                }
            }
        }
        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|c| record.get(c).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        Self {
            name: name.into(),
            columns,
            rows,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
    }

    pub fn column_index(&self, column: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| EtlError::missing_column(&self.name, column))
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn value(&self, row: usize, column: &str) -> Result<&Value> {
        let idx = self.column_index(column)?;
        self.rows
            .get(row)
            .map(|values| &values[idx])
            .ok_or_else(|| EtlError::RowOutOfRange {
                table: self.name.clone(),
                row,
                len: self.rows.len(),
            })
    }

    /// All values of one column, in row order.
    pub fn column_values(&self, column: &str) -> Result<Vec<&Value>> {
        let idx = self.column_index(column)?;
        Ok(self.rows.iter().map(|row| &row[idx]).collect())
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Keeps the listed columns in the listed order. Every column must exist.
    pub fn select(&self, columns: &[&str]) -> Result<Table> {
        let indices = columns
            .iter()
            .map(|c| self.column_index(c))
            .collect::<Result<Vec<_>>>()?;
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Ok(Table {
            name: self.name.clone(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        })
    }

    /// Renames columns given as `(from, to)` pairs. Every `from` must exist.
    pub fn rename(&self, renames: &[(&str, &str)]) -> Result<Table> {
        let mut columns = self.columns.clone();
        for (from, to) in renames {
            let idx = self.column_index(from)?;
            columns[idx] = to.to_string();
        }
        Ok(Table {
            name: self.name.clone(),
            columns,
            rows: self.rows.clone(),
        })
    }

    /// First `n` rows, or the whole table when `n` is `None`.
    pub fn head(&self, n: Option<usize>) -> Table {
        let take = n.unwrap_or(self.rows.len()).min(self.rows.len());
        Table {
            name: self.name.clone(),
            columns: self.columns.clone(),
            rows: self.rows[..take].to_vec(),
        }
    }

    /// Rows for which `keep` returns true, order preserved.
    pub fn filter<F>(&self, mut keep: F) -> Table
    where
        F: FnMut(&[Value]) -> bool,
    {
        Table {
            name: self.name.clone(),
            columns: self.columns.clone(),
            rows: self.rows.iter().filter(|row| keep(row)).cloned().collect(),
        }
    }

    /// One record per row, fields in column order.
    pub fn to_records(&self) -> Vec<RawRecord> {
        self.rows
            .iter()
            .map(|row| {
                let mut record = RawRecord::new();
                for (column, value) in self.columns.iter().zip(row) {
                    record.insert(column.as_str(), value.clone());
                }
                record
            })
            .collect()
    }

    pub(crate) fn from_parts(name: String, columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { name, columns, rows }
    }
}
