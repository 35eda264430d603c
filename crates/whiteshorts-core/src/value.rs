// Scalar values, rows and batches carried through the broadcast pipeline.
//
// A `Row` is an ordered column -> `Scalar` mapping; a `Batch` is an ordered
// sequence of rows that usually, but not always, share the same columns.

use std::cmp::Ordering;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Scalar
// ---------------------------------------------------------------------------

/// A single cell value.
///
/// Serializes untagged, so a row of scalars becomes a flat JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// True for `Null` and for a float NaN.
    pub fn is_null(&self) -> bool {
        match self {
            Scalar::Null => true,
            Scalar::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    /// True for a float that is NaN or +/-Infinity.
    pub fn is_non_finite(&self) -> bool {
        matches!(self, Scalar::Float(f) if !f.is_finite())
    }

    /// Read the value as a number.
    ///
    /// Integers and floats convert directly (NaN reads as `None`, infinities
    /// are kept), text is parsed with [`parse_number`], booleans and nulls
    /// are not numbers.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Scalar::Int(i) => Some(*i as f64),
            Scalar::Float(f) if f.is_nan() => None,
            Scalar::Float(f) => Some(*f),
            Scalar::Text(s) => parse_number(s).and_then(|v| v.as_number()),
            Scalar::Bool(_) | Scalar::Null => None,
        }
    }

    /// Like [`Scalar::as_number`], but infinities also read as `None`.
    pub fn as_finite(&self) -> Option<f64> {
        self.as_number().filter(|v| v.is_finite())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Total order used for group keys: numbers (by value), then text,
    /// then booleans, then nulls.
    pub fn key_cmp(&self, other: &Scalar) -> Ordering {
        fn rank(s: &Scalar) -> u8 {
            match s {
                Scalar::Int(_) | Scalar::Float(_) if !s.is_null() => 0,
                Scalar::Text(_) => 1,
                Scalar::Bool(_) => 2,
                _ => 3,
            }
        }
        match (self, other) {
            (Scalar::Text(a), Scalar::Text(b)) => a.cmp(b),
            (Scalar::Bool(a), Scalar::Bool(b)) => a.cmp(b),
            _ => match (rank(self), rank(other)) {
                (0, 0) => {
                    let a = self.as_number().unwrap_or(f64::NAN);
                    let b = other.as_number().unwrap_or(f64::NAN);
                    a.total_cmp(&b)
                }
                (ra, rb) => ra.cmp(&rb),
            },
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => Ok(()),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Float(v) => write!(f, "{v}"),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Text(s)
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Scalar::Int(i)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(v: Option<T>) -> Self {
        v.map_or(Scalar::Null, Into::into)
    }
}

/// Parse text as a number: an integer token becomes `Int`, anything else
/// that parses as a float becomes `Float`. Surrounding whitespace is ignored.
///
/// Returns `None` for empty text, unparsable text and NaN.
pub fn parse_number(text: &str) -> Option<Scalar> {
    let t = text.trim();
    if t.is_empty() {
        return None;
    }
    if let Ok(i) = t.parse::<i64>() {
        return Some(Scalar::Int(i));
    }
    match t.parse::<f64>() {
        Ok(v) if v.is_nan() => None,
        Ok(v) => Some(Scalar::Float(v)),
        Err(_) => None,
    }
}

// ---------------------------------------------------------------------------
// Row
// ---------------------------------------------------------------------------

/// One prediction record: an insertion-ordered column -> value mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: Vec<(String, Scalar)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cells: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, column: &str) -> Option<&Scalar> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn get_mut(&mut self, column: &str) -> Option<&mut Scalar> {
        self.cells
            .iter_mut()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    /// Absent from the row, or present but null.
    pub fn is_missing(&self, column: &str) -> bool {
        self.get(column).map_or(true, Scalar::is_null)
    }

    /// Set `column` to `value`. An existing column keeps its position and
    /// has its value replaced; the previous value is returned.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Scalar>) -> Option<Scalar> {
        let column = column.into();
        let value = value.into();
        if let Some(idx) = self.cells.iter().position(|(name, _)| *name == column) {
            return Some(std::mem::replace(&mut self.cells[idx].1, value));
        }
        self.cells.push((column, value));
        None
    }

    pub fn remove(&mut self, column: &str) -> Option<Scalar> {
        let idx = self.cells.iter().position(|(name, _)| name == column)?;
        Some(self.cells.remove(idx).1)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Scalar)> {
        self.cells.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut Scalar> {
        self.cells.iter_mut().map(|(_, value)| value)
    }

    /// True if any cell holds NaN or +/-Infinity.
    pub fn has_non_finite(&self) -> bool {
        self.cells.iter().any(|(_, value)| value.is_non_finite())
    }
}

impl<K: Into<String>, V: Into<Scalar>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (k, v) in iter {
            row.insert(k, v);
        }
        row
    }
}

impl IntoIterator for Row {
    type Item = (String, Scalar);
    type IntoIter = std::vec::IntoIter<(String, Scalar)>;

    fn into_iter(self) -> Self::IntoIter {
        self.cells.into_iter()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (name, value) in &self.cells {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Row {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RowVisitor;

        impl<'de> Visitor<'de> for RowVisitor {
            type Value = Row;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a flat object of column -> scalar")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Row, A::Error> {
                let mut row = Row::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, value)) = access.next_entry::<String, Scalar>()? {
                    row.insert(name, value);
                }
                Ok(row)
            }
        }

        deserializer.deserialize_map(RowVisitor)
    }
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// An ordered collection of rows processed together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Batch {
    rows: Vec<Row>,
}

impl Batch {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    /// Ordered union of column names; a column sits where it first appears.
    pub fn columns(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for row in &self.rows {
            for name in row.columns() {
                if !seen.iter().any(|s| s == name) {
                    seen.push(name.to_string());
                }
            }
        }
        seen
    }

    /// True if at least one row carries `column`.
    pub fn has_column(&self, column: &str) -> bool {
        self.rows.iter().any(|row| row.contains(column))
    }
}

impl From<Vec<Row>> for Batch {
    fn from(rows: Vec<Row>) -> Self {
        Self { rows }
    }
}

impl FromIterator<Row> for Batch {
    fn from_iter<I: IntoIterator<Item = Row>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Batch {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a Batch {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
