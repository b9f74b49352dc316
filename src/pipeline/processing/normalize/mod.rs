use chrono::{NaiveDate, NaiveDateTime};
use tracing::debug;

use crate::domain::{PostcodeKey, Value};
use crate::error::{EtlError, Result};
use crate::table::Table;

pub mod rules;

pub use rules::{CaseStyle, ColumnRule, NormalizationRules, SynonymMap};

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d", "%d-%m-%Y"];
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%d/%m/%Y %H:%M"];

/// Cleans a table according to `rules` and returns the cleaned copy.
///
/// Per cell the steps run in a fixed order: strip, postcode
/// canonicalisation, casing, synonym mapping (followed until the value
/// settles), date parsing. Rows whose `drop_if_empty` columns end up empty
/// are removed; survivors keep their relative order. Every column named in
/// `rules` must exist in `table`, and `rules` must pass
/// [`NormalizationRules::validate`].
pub fn normalize(table: &Table, rules: &NormalizationRules) -> Result<Table> {
    rules.validate()?;
    let mut plans = Vec::with_capacity(rules.columns.len());
    for (column, rule) in &rules.columns {
        plans.push((table.column_index(column)?, column.as_str(), rule));
    }
    let strip: Vec<bool> = table.columns().iter().map(|c| rules.strips(c)).collect();

    let mut rows = Vec::with_capacity(table.len());
    let mut dropped = 0usize;
    'rows: for row in table.rows() {
        let mut cleaned: Vec<Value> = row
            .iter()
            .zip(&strip)
            .map(|(value, &strip)| if strip { strip_value(value) } else { value.clone() })
            .collect();

        for &(idx, column, rule) in &plans {
            cleaned[idx] = apply_rule(column, &cleaned[idx], rule, strip[idx])?;
        }
        for &(idx, _, rule) in &plans {
            if rule.drop_if_empty && cleaned[idx].is_empty() {
                dropped += 1;
                continue 'rows;
            }
        }
        rows.push(cleaned);
    }

    debug!(
        table = table.name(),
        rules_version = %rules.version,
        kept = rows.len(),
        dropped,
        "normalized table"
    );
    crate::observability::metrics::normalize::rows_processed(table.name(), rows.len(), dropped);

    Ok(Table::from_parts(
        table.name().to_string(),
        table.columns().to_vec(),
        rows,
    ))
}

fn strip_value(value: &Value) -> Value {
    match value {
        Value::Text(s) => Value::Text(s.trim().to_string()),
        other => other.clone(),
    }
}

fn apply_rule(column: &str, value: &Value, rule: &ColumnRule, strip: bool) -> Result<Value> {
    let (mut value, _) = canonical_form(value, rule, strip);
    if rule.parse_date {
        value = parse_date_value(column, &value)?;
    }
    Ok(value)
}

/// Strip, postcode canonicalisation and casing for one text value.
fn shape_text(s: &str, rule: &ColumnRule, strip: bool) -> Value {
    let s = if strip { s.trim() } else { s };
    let text = if rule.postcode {
        match PostcodeKey::parse(s) {
            Some(key) => key.as_str().to_string(),
            None => return Value::Null,
        }
    } else {
        s.to_string()
    };
    match rule.title_case {
        Some(style) => Value::Text(apply_case(&text, style)),
        None => Value::Text(text),
    }
}

/// Shapes a value, then follows the synonym map until the value stops
/// changing. Each canonical value is shaped like an input value, so chained
/// entries (`a -> b`, `b -> c`) and canonical values in a different case
/// settle on the same final text. The flag is false when the map holds a
/// cycle and the value never settled.
pub(crate) fn canonical_form(value: &Value, rule: &ColumnRule, strip: bool) -> (Value, bool) {
    let mut current = match value {
        Value::Text(s) => shape_text(s, rule, strip),
        other => return (other.clone(), true),
    };
    for _ in 0..=rule.synonyms.len() {
        let next = match &current {
            Value::Text(s) => match rule.synonyms.canonical(s) {
                Some(canonical) => shape_text(canonical, rule, strip),
                None => return (current, true),
            },
            _ => return (current, true),
        };
        if next == current {
            return (current, true);
        }
        current = next;
    }
    (current, false)
}

/// Applies a casing style to free text.
pub fn apply_case(s: &str, style: CaseStyle) -> String {
    match style {
        CaseStyle::Words => s
            .split_whitespace()
            .map(capitalize_word)
            .collect::<Vec<_>>()
            .join(" "),
        CaseStyle::Title => {
            let mut out = String::with_capacity(s.len());
            let mut prev_alpha = false;
            for c in s.chars() {
                if c.is_alphabetic() {
                    if prev_alpha {
                        out.extend(c.to_lowercase());
                    } else {
                        out.extend(c.to_uppercase());
                    }
                    prev_alpha = true;
                } else {
                    out.push(c);
                    prev_alpha = false;
                }
            }
            out
        }
        CaseStyle::Upper => s.to_uppercase(),
    }
}

fn capitalize_word(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

fn parse_date_value(column: &str, value: &Value) -> Result<Value> {
    match value {
        Value::Text(s) if s.trim().is_empty() => Ok(Value::Null),
        Value::Text(s) => parse_date(s.trim())
            .map(Value::Date)
            .ok_or_else(|| EtlError::UnparseableDate {
                column: column.to_string(),
                value: s.clone(),
            }),
        Value::Null | Value::Date(_) => Ok(value.clone()),
        other => Err(EtlError::UnparseableDate {
            column: column.to_string(),
            value: other.to_string(),
        }),
    }
}

/// Parses the date layouts seen in the census extracts. Slash-separated
/// dates are read day-first.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.date())
        })
}
