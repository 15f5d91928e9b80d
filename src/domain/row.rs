//! Untyped source rows
//!
//! A [`SourceRow`] is one result row from a datatype query, keyed by output
//! column name. Rows may carry more columns than the descriptor uses.
//! [`SourceRows`] is the pull-based page handed from a source to the
//! orchestrator: finite, consumed once, and closed when the page is done.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One untyped row read from the source database
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceRow(Map<String, Value>);

impl SourceRow {
    /// Create an empty row
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Look up a column value
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    /// Set a column value, returning the row for chaining
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(column.into(), value.into());
        self
    }

    /// Set a column value in place
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(column.into(), value.into());
    }

    /// Remove a column
    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.0.remove(column)
    }

    /// Read a column as an integer, accepting numeric strings
    pub fn get_i64(&self, column: &str) -> Option<i64> {
        match self.0.get(column)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Read a column as a float, accepting numeric strings
    pub fn get_f64(&self, column: &str) -> Option<f64> {
        match self.0.get(column)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Read a column as a string slice
    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.0.get(column).and_then(Value::as_str)
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the row has no columns
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Serialize the raw row for diagnostics
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "<unserializable row>".to_string())
    }

    /// Consume the row and return the underlying map
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for SourceRow {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for SourceRow {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(format!("expected a JSON object for a source row, got {other}")),
        }
    }
}

/// One fetched page of source rows
///
/// Iterating yields rows in query order. The page cannot be restarted; call
/// [`SourceRows::close`] once the page has been fully processed.
#[derive(Debug)]
pub struct SourceRows {
    rows: std::vec::IntoIter<SourceRow>,
    fetched: usize,
}

impl SourceRows {
    /// Wrap rows fetched from a source
    pub fn new(rows: Vec<SourceRow>) -> Self {
        let fetched = rows.len();
        Self {
            rows: rows.into_iter(),
            fetched,
        }
    }

    /// An empty page, signalling end of stream
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Number of rows the page was created with
    pub fn fetched(&self) -> usize {
        self.fetched
    }

    /// Whether the page was empty when fetched
    pub fn is_exhausted(&self) -> bool {
        self.fetched == 0
    }

    /// Release the page
    pub fn close(self) {
        tracing::trace!(rows = self.fetched, "Closing source page");
    }
}

impl Iterator for SourceRows {
    type Item = SourceRow;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_accessors_accept_strings() {
        let row = SourceRow::new()
            .with("id", "42")
            .with("grade", json!(7.5))
            .with("name", "Ada");

        assert_eq!(row.get_i64("id"), Some(42));
        assert_eq!(row.get_f64("grade"), Some(7.5));
        assert_eq!(row.get_str("name"), Some("Ada"));
        assert_eq!(row.get_i64("missing"), None);
    }

    #[test]
    fn test_try_from_rejects_non_objects() {
        assert!(SourceRow::try_from(json!([1, 2])).is_err());
        let row = SourceRow::try_from(json!({"id": 1})).unwrap();
        assert_eq!(row.get_i64("id"), Some(1));
    }

    #[test]
    fn test_source_rows_is_single_pass() {
        let mut page = SourceRows::new(vec![
            SourceRow::new().with("id", 1),
            SourceRow::new().with("id", 2),
        ]);
        assert_eq!(page.fetched(), 2);
        assert_eq!(page.next().and_then(|r| r.get_i64("id")), Some(1));
        assert_eq!(page.next().and_then(|r| r.get_i64("id")), Some(2));
        assert!(page.next().is_none());
        assert!(!page.is_exhausted());
        page.close();

        assert!(SourceRows::empty().is_exhausted());
    }
}
