use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::domain::{KeyPart, Value};
use crate::error::{EtlError, Result};
use crate::table::Table;

pub const LEFT_SUFFIX: &str = "_x";
pub const RIGHT_SUFFIX: &str = "_y";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    /// Every left row appears; output follows left row order.
    Left,
    /// Every right row appears; output follows right row order.
    Right,
}

/// Outer join of `left` and `right` on the shared column `on`.
///
/// The output has the key column once, then the remaining left columns,
/// then the remaining right columns. Non-key columns present on both sides
/// are suffixed with `_x` (left) and `_y` (right). Rows on the non-driving
/// side must be unique per key; a repeat is reported as
/// [`EtlError::DuplicateJoinKey`] rather than fanned out. Null keys never
/// match.
pub fn join(left: &Table, right: &Table, on: &str, kind: JoinKind) -> Result<Table> {
    let left_key = left.column_index(on)?;
    let right_key = right.column_index(on)?;
    check_key_types(left, left_key, right, right_key, on)?;

    let (driving, driving_key, lookup, lookup_key, lookup_side) = match kind {
        JoinKind::Left => (left, left_key, right, right_key, "right"),
        JoinKind::Right => (right, right_key, left, left_key, "left"),
    };

    let mut index: HashMap<KeyPart, usize> = HashMap::with_capacity(lookup.len());
    for (pos, row) in lookup.rows().iter().enumerate() {
        let key = &row[lookup_key];
        if key.is_null() {
            continue;
        }
        if index.insert(key.key(), pos).is_some() {
            return Err(EtlError::DuplicateJoinKey {
                column: on.to_string(),
                side: lookup_side,
                value: key.to_string(),
            });
        }
    }

    let columns = output_columns(left, left_key, right, right_key, on);
    let mut rows = Vec::with_capacity(driving.len());
    let mut matched = 0usize;
    for row in driving.rows() {
        let key = &row[driving_key];
        let other = if key.is_null() {
            None
        } else {
            index.get(&key.key()).map(|&pos| &lookup.rows()[pos])
        };
        if other.is_some() {
            matched += 1;
        }
        let (left_row, right_row) = match kind {
            JoinKind::Left => (Some(row), other),
            JoinKind::Right => (other, Some(row)),
        };
        rows.push(combine(
            left_row,
            left_key,
            left.columns().len(),
            right_row,
            right_key,
            right.columns().len(),
            key,
        ));
    }

    debug!(
        left = left.name(),
        right = right.name(),
        on,
        ?kind,
        rows = rows.len(),
        matched,
        "joined tables"
    );

    Ok(Table::from_parts(left.name().to_string(), columns, rows))
}

fn check_key_types(
    left: &Table,
    left_key: usize,
    right: &Table,
    right_key: usize,
    on: &str,
) -> Result<()> {
    let type_of = |table: &Table, idx: usize| {
        table
            .rows()
            .iter()
            .map(|row| &row[idx])
            .find(|v| !v.is_null())
            .map(Value::type_name)
    };
    match (type_of(left, left_key), type_of(right, right_key)) {
        (Some(l), Some(r)) if l != r => Err(EtlError::JoinKeyTypeMismatch {
            column: on.to_string(),
            left: l,
            right: r,
        }),
        _ => Ok(()),
    }
}

fn output_columns(
    left: &Table,
    left_key: usize,
    right: &Table,
    right_key: usize,
    on: &str,
) -> Vec<String> {
    let rest = |table: &Table, key: usize| -> Vec<String> {
        table
            .columns()
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != key)
            .map(|(_, c)| c.clone())
            .collect()
    };
    let left_rest = rest(left, left_key);
    let right_rest = rest(right, right_key);

    let mut columns = vec![on.to_string()];
    for c in &left_rest {
        if right_rest.contains(c) {
            columns.push(format!("{}{}", c, LEFT_SUFFIX));
        } else {
            columns.push(c.to_string());
        }
    }
    for c in &right_rest {
        if left_rest.contains(c) {
            columns.push(format!("{}{}", c, RIGHT_SUFFIX));
        } else {
            columns.push(c.to_string());
        }
    }
    columns
}

fn combine(
    left: Option<&Vec<Value>>,
    left_key: usize,
    left_width: usize,
    right: Option<&Vec<Value>>,
    right_key: usize,
    right_width: usize,
    key: &Value,
) -> Vec<Value> {
    let mut out = Vec::with_capacity(left_width + right_width - 1);
    out.push(key.clone());
    for i in (0..left_width).filter(|&i| i != left_key) {
        out.push(left.map(|row| row[i].clone()).unwrap_or(Value::Null));
    }
    for i in (0..right_width).filter(|&i| i != right_key) {
        out.push(right.map(|row| row[i].clone()).unwrap_or(Value::Null));
    }
    out
}
