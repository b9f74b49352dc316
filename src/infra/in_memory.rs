//! Source and sink adapters that keep everything in process memory.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, PoisonError};

use crate::app::ports::{SinkPort, SinkReceipt, SourcePort};
use crate::domain::RawRecord;
use crate::error::{EtlError, Result};
use crate::observability::metrics;
use crate::table::Table;

#[derive(Default)]
pub struct InMemorySource {
    datasets: HashMap<String, Vec<RawRecord>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dataset(mut self, name: &str, records: Vec<RawRecord>) -> Self {
        self.datasets.insert(name.to_string(), records);
        self
    }

    pub fn with_table(self, name: &str, table: &Table) -> Self {
        self.with_dataset(name, table.to_records())
    }
}

#[async_trait]
impl SourcePort for InMemorySource {
    async fn fetch(&self, dataset: &str) -> Result<Vec<RawRecord>> {
        self.datasets
            .get(dataset)
            .cloned()
            .ok_or_else(|| EtlError::Source {
                dataset: dataset.to_string(),
                message: "no such dataset".to_string(),
            })
    }
}

/// Append-only sink: every write adds its rows, duplicates included.
#[derive(Default)]
pub struct InMemorySink {
    tables: Mutex<BTreeMap<String, Table>>,
    failing: BTreeSet<String>,
    writes: Mutex<usize>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects every write to `table_name`.
    pub fn failing_on(mut self, table_name: &str) -> Self {
        self.failing.insert(table_name.to_string());
        self
    }

    pub fn table(&self, table_name: &str) -> Option<Table> {
        self.tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(table_name)
            .cloned()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn write_count(&self) -> usize {
        *self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SinkPort for InMemorySink {
    async fn write(&self, table_name: &str, table: &Table) -> Result<SinkReceipt> {
        *self.writes.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        if self.failing.contains(table_name) {
            metrics::sink::write_error(table_name);
            return Err(EtlError::Sink {
                table: table_name.to_string(),
                message: "write rejected".to_string(),
            });
        }

        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        match tables.get_mut(table_name) {
            Some(existing) => {
                for row in table.rows() {
                    existing.push_row(row.clone());
                }
            }
            None => {
                tables.insert(table_name.to_string(), table.clone().with_name(table_name));
            }
        }
        metrics::sink::rows_written(table_name, table.len(), table.len());
        Ok(SinkReceipt {
            table: table_name.to_string(),
            rows_offered: table.len(),
            rows_written: table.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Value;

    #[tokio::test]
    async fn repeated_writes_append_duplicates() {
        let sink = InMemorySink::new();
        let table = Table::from_rows("t", &["a"], vec![vec![Value::text("x")]]);
        sink.write("t", &table).await.unwrap();
        sink.write("t", &table).await.unwrap();
        assert_eq!(sink.table("t").unwrap().len(), 2);
        assert_eq!(sink.write_count(), 2);
    }

    #[tokio::test]
    async fn unknown_dataset_is_a_source_error() {
        let err = InMemorySource::new().fetch("missing.csv").await.unwrap_err();
        assert!(matches!(err, EtlError::Source { .. }));
    }
}
