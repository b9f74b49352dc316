use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An untyped scalar cell as read from a flat-file source or produced by a
/// transform stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Text(String),
    Int(i64),
    Float(f64),
    Date(NaiveDate),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Null, or text that is empty once surrounding whitespace is ignored.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Name of the variant, used when reporting key type mismatches.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Text(_) => "text",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Date(_) => "date",
        }
    }

    /// Hashable representation used for grouping and join lookups.
    pub fn key(&self) -> KeyPart {
        match self {
            Value::Null => KeyPart::Null,
            Value::Text(s) => KeyPart::Text(s.clone()),
            Value::Int(i) => KeyPart::Int(*i),
            Value::Float(f) => KeyPart::Float(f.to_bits()),
            Value::Date(d) => KeyPart::Date(*d),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Text(s) => f.write_str(s),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Exact-match component of a grouping or join key. Nulls compare equal to
/// each other, floats compare by bit pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyPart {
    Null,
    Text(String),
    Int(i64),
    Float(u64),
    Date(NaiveDate),
}

/// One row as delivered by a source: column name to value, in source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    fields: Vec<(String, Value)>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    /// Sets a field, replacing the value in place if the column already exists.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| *name == column) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }
}

/// Canonical postcode: uppercase with all whitespace removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostcodeKey(String);

impl PostcodeKey {
    /// Returns `None` when nothing is left after stripping whitespace.
    pub fn parse(raw: &str) -> Option<Self> {
        let compact: String = raw
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '+')
            .flat_map(char::to_uppercase)
            .collect();
        if compact.is_empty() {
            None
        } else {
            Some(Self(compact))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PostcodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A resolved latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Outcome of enriching one postcode. Either both coordinates are known or
/// neither is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Coordinate {
    Present(GeoPoint),
    Absent,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Coordinate::Present(GeoPoint { latitude, longitude })
    }

    pub fn point(&self) -> Option<GeoPoint> {
        match self {
            Coordinate::Present(point) => Some(*point),
            Coordinate::Absent => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Coordinate::Absent)
    }
}

/// A postcode whose coordinates were successfully resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedPostcode {
    pub postcode: PostcodeKey,
    pub point: GeoPoint,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postcode_key_strips_whitespace_and_uppercases() {
        assert_eq!(PostcodeKey::parse(" sw1a 1aa ").unwrap().as_str(), "SW1A1AA");
        assert_eq!(PostcodeKey::parse("SW1A+1AA").unwrap().as_str(), "SW1A1AA");
        assert_eq!(PostcodeKey::parse("SW1A\t1AA"), PostcodeKey::parse("sw1a1aa"));
        assert!(PostcodeKey::parse("   ").is_none());
    }

    #[test]
    fn raw_record_insert_replaces_in_place() {
        let mut record = RawRecord::new().with("a", "1").with("b", "2");
        record.insert("a", "3");
        let names: Vec<&str> = record.fields().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(record.get("a"), Some(&Value::text("3")));
    }

    #[test]
    fn empty_detection() {
        assert!(Value::Null.is_empty());
        assert!(Value::text("  ").is_empty());
        assert!(!Value::text("x").is_empty());
        assert!(!Value::Float(0.0).is_empty());
    }
}
