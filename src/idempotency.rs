use sha2::{Digest, Sha256};

use crate::domain::Value;

/// Stable identity of a row for sinks that enforce uniqueness.
///
/// The canonical string is the table name followed by each value as
/// `type:text`, all separated by `|`. Including the type keeps `Int(1)` and
/// `Text("1")` apart.
pub fn compute_row_key(table: &str, row: &[Value]) -> String {
    let mut s = String::new();
    s.push_str(table);
    for value in row {
        s.push('|');
        s.push_str(value.type_name());
        s.push(':');
        if !value.is_null() {
            // Pipes inside values must not collide with the separator.
            s.push_str(&value.to_string().replace('\\', "\\\\").replace('|', "\\|"));
        }
    }

    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_row_same_key() {
        let row = vec![Value::text("SW1A1AA"), Value::Float(51.5014), Value::Null];
        assert_eq!(compute_row_key("t", &row), compute_row_key("t", &row));
        assert_eq!(compute_row_key("t", &row).len(), 64);
    }

    #[test]
    fn key_depends_on_table_types_and_boundaries() {
        let row = vec![Value::text("a|b"), Value::text("c")];
        let shifted = vec![Value::text("a"), Value::text("b|c")];
        assert_ne!(compute_row_key("t", &row), compute_row_key("t", &shifted));
        assert_ne!(compute_row_key("t", &row), compute_row_key("u", &row));
        assert_ne!(
            compute_row_key("t", &[Value::Int(1)]),
            compute_row_key("t", &[Value::text("1")])
        );
    }
}
