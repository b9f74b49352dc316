use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::domain::KeyPart;
use crate::error::Result;
use crate::table::Table;

/// Which row survives when several share a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Keep {
    First,
    Last,
}

/// One deduplication pass: a key (one or more columns) and a keep policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupePass {
    pub key: Vec<String>,
    pub keep: Keep,
}

impl DedupePass {
    pub fn new(key: &[&str], keep: Keep) -> Self {
        Self {
            key: key.iter().map(|c| c.to_string()).collect(),
            keep,
        }
    }
}

/// Removes rows whose key tuple was already seen. Survivors keep their
/// original relative order.
pub fn dedupe(table: &Table, key: &[&str], keep: Keep) -> Result<Table> {
    let indices = key
        .iter()
        .map(|c| table.column_index(c))
        .collect::<Result<Vec<_>>>()?;
    let key_of = |row: &[crate::domain::Value]| -> Vec<KeyPart> {
        indices.iter().map(|&i| row[i].key()).collect()
    };

    // Position of the surviving row for each key.
    let mut winner: HashMap<Vec<KeyPart>, usize> = HashMap::with_capacity(table.len());
    for (pos, row) in table.rows().iter().enumerate() {
        let slot = winner.entry(key_of(row)).or_insert(pos);
        if keep == Keep::Last {
            *slot = pos;
        }
    }

    let rows: Vec<_> = table
        .rows()
        .iter()
        .enumerate()
        .filter(|(pos, row)| winner.get(&key_of(row)) == Some(pos))
        .map(|(_, row)| row.clone())
        .collect();

    let removed = table.len() - rows.len();
    debug!(table = table.name(), key = ?key, ?keep, removed, "deduplicated table");
    crate::observability::metrics::dedupe::rows_removed(table.name(), removed);

    Ok(Table::from_parts(
        table.name().to_string(),
        table.columns().to_vec(),
        rows,
    ))
}

/// Applies passes left to right, each on the output of the one before.
/// This is not the same as a single multi-column dedupe and the result
/// depends on pass order.
pub fn dedupe_sequence(table: &Table, passes: &[DedupePass]) -> Result<Table> {
    let mut current = table.clone();
    for pass in passes {
        let key: Vec<&str> = pass.key.iter().map(String::as_str).collect();
        current = dedupe(&current, &key, pass.keep)?;
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Value;
    use std::collections::HashSet;

    fn boroughs() -> Table {
        Table::from_rows(
            "boroughs",
            &["borough_code", "borough_name"],
            vec![
                vec!["E09000033".into(), "Westminster".into()],
                vec!["E09000033".into(), "City Of Westminster".into()],
            ],
        )
    }

    #[test]
    fn keep_first_and_keep_last() {
        let table = Table::from_rows(
            "t",
            &["k", "v"],
            vec![
                vec!["a".into(), "1".into()],
                vec!["b".into(), "2".into()],
                vec!["a".into(), "3".into()],
            ],
        );
        let first = dedupe(&table, &["k"], Keep::First).unwrap();
        assert_eq!(
            first.rows(),
            &[
                vec![Value::text("a"), Value::text("1")],
                vec![Value::text("b"), Value::text("2")],
            ]
        );
        let last = dedupe(&table, &["k"], Keep::Last).unwrap();
        assert_eq!(
            last.rows(),
            &[
                vec![Value::text("b"), Value::text("2")],
                vec![Value::text("a"), Value::text("3")],
            ]
        );
    }

    #[test]
    fn output_keys_are_unique() {
        let table = Table::from_rows(
            "t",
            &["k1", "k2"],
            vec![
                vec!["a".into(), "x".into()],
                vec!["a".into(), "y".into()],
                vec!["a".into(), "x".into()],
                vec![Value::Null, "x".into()],
                vec![Value::Null, "x".into()],
            ],
        );
        let out = dedupe(&table, &["k1", "k2"], Keep::First).unwrap();
        let keys: HashSet<Vec<KeyPart>> = out
            .rows()
            .iter()
            .map(|r| vec![r[0].key(), r[1].key()])
            .collect();
        assert_eq!(keys.len(), out.len());
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn borough_scenario_name_then_code_keep_last() {
        let passes = vec![
            DedupePass::new(&["borough_name"], Keep::Last),
            DedupePass::new(&["borough_code"], Keep::Last),
        ];
        let out = dedupe_sequence(&boroughs(), &passes).unwrap();
        assert_eq!(
            out.rows(),
            &[vec![Value::text("E09000033"), Value::text("City Of Westminster")]]
        );
    }

    #[test]
    fn pass_order_matters() {
        // Two codes collapsing onto one name: deduping by name first loses a code.
        let table = Table::from_rows(
            "boroughs",
            &["borough_code", "borough_name"],
            vec![
                vec!["E09000001".into(), "City Of London".into()],
                vec!["E09000099".into(), "City Of London".into()],
            ],
        );
        let name_first = dedupe_sequence(
            &table,
            &[
                DedupePass::new(&["borough_name"], Keep::Last),
                DedupePass::new(&["borough_code"], Keep::Last),
            ],
        )
        .unwrap();
        assert_eq!(name_first.len(), 1);

        let by_code = DedupePass::new(&["borough_code"], Keep::Last);
        let code_only = dedupe_sequence(&table, &[by_code]).unwrap();
        assert_eq!(code_only.len(), 2);
    }

    #[test]
    fn unknown_key_column_is_rejected() {
        assert!(dedupe(&boroughs(), &["nope"], Keep::First).unwrap_err().is_schema_violation());
    }
}
