use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::app::ports::SourcePort;
use crate::domain::{RawRecord, Value};
use crate::error::{EtlError, Result};

/// Reads datasets as CSV files from a local directory. The header row gives
/// the column order; empty cells become nulls.
pub struct CsvDirectorySource {
    dir: PathBuf,
}

impl CsvDirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl SourcePort for CsvDirectorySource {
    async fn fetch(&self, dataset: &str) -> Result<Vec<RawRecord>> {
        let path = self.dir.join(dataset);
        let bytes = tokio::fs::read(&path).await.map_err(|e| EtlError::Source {
            dataset: dataset.to_string(),
            message: format!("{}: {}", path.display(), e),
        })?;
        let records = parse_csv(&bytes)?;
        debug!(dataset, rows = records.len(), "read dataset");
        Ok(records)
    }
}

pub fn parse_csv(bytes: &[u8]) -> Result<Vec<RawRecord>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);
    let headers = reader.headers()?.clone();
    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let mut record = RawRecord::new();
        for (i, column) in headers.iter().enumerate() {
            let value = match row.get(i) {
                Some(cell) if !cell.is_empty() => Value::text(cell),
                _ => Value::Null,
            };
            record.insert(column, value);
        }
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cells_become_null() {
        let records = parse_csv(b"postcode,posttown\nSW1A 1AA,\n,LONDON\n").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("postcode"), Some(&Value::text("SW1A 1AA")));
        assert_eq!(records[0].get("posttown"), Some(&Value::Null));
        assert_eq!(records[1].get("postcode"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn missing_file_is_a_source_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = CsvDirectorySource::new(dir.path());
        let err = source.fetch("nope.csv").await.unwrap_err();
        assert!(matches!(err, EtlError::Source { .. }));
    }
}
