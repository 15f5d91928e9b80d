//! In-memory source database
//!
//! Rows are stored per base table exactly as the datatype query would return
//! them (joined columns already present, aggregated datatypes already
//! grouped). Joins and base predicates are not evaluated; keyset bounds,
//! ordering, offset and limit are.

use crate::adapters::database::traits::SourceDatabase;
use crate::core::query::{Bound, CursorMode, SourceQuery};
use crate::domain::row::SourceRow;
use crate::domain::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Source database backed by vectors of rows
#[derive(Debug, Default)]
pub struct MemorySource {
    tables: Mutex<HashMap<String, Vec<SourceRow>>>,
}

impl MemorySource {
    /// Create an empty source with no tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table while building the source
    pub fn with_table(mut self, table: impl Into<String>, rows: Vec<SourceRow>) -> Self {
        self.tables.get_mut().insert(table.into(), rows);
        self
    }

    /// Append rows to a table, creating it if needed
    pub async fn insert_rows(&self, table: &str, rows: Vec<SourceRow>) {
        self.tables
            .lock()
            .await
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    /// Drop a table
    pub async fn drop_table(&self, table: &str) {
        self.tables.lock().await.remove(table);
    }

    async fn matching_rows(&self, query: &SourceQuery<'_>) -> Vec<SourceRow> {
        let tables = self.tables.lock().await;
        let Some(rows) = tables.get(query.spec.table()) else {
            return Vec::new();
        };

        let mode = query.spec.cursor_mode();
        let keys = sort_keys(mode);
        let mut selected: Vec<SourceRow> = rows
            .iter()
            .filter(|row| after_bound(row, mode, query.bound))
            .cloned()
            .collect();
        selected.sort_by(|a, b| compare_rows(a, b, &keys));
        selected
    }
}

fn sort_keys(mode: &CursorMode) -> Vec<&str> {
    match mode {
        CursorMode::Id { key, .. } => vec![key.as_str()],
        CursorMode::Timestamp { key, id_key, .. } => vec![key.as_str(), id_key.as_str()],
        CursorMode::Grouped { order_keys, .. } => order_keys.iter().map(String::as_str).collect(),
    }
}

fn after_bound(row: &SourceRow, mode: &CursorMode, bound: Option<Bound>) -> bool {
    match (bound, mode) {
        (None, _) => true,
        (Some(Bound::Id(last)), CursorMode::Id { key, .. }) => {
            row.get_i64(key).is_some_and(|id| id > last)
        }
        (Some(Bound::Timestamp(time, id)), CursorMode::Timestamp { key, id_key, .. }) => {
            match (row.get_i64(key), row.get_i64(id_key)) {
                (Some(t), Some(i)) => t > time || (t == time && i > id),
                _ => false,
            }
        }
        _ => true,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

fn compare_rows(a: &SourceRow, b: &SourceRow, keys: &[&str]) -> Ordering {
    keys.iter()
        .map(|key| compare_values(a.get(key), b.get(key)))
        .find(|ord| *ord != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

#[async_trait]
impl SourceDatabase for MemorySource {
    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.tables.lock().await.contains_key(table))
    }

    async fn count(&self, query: &SourceQuery<'_>) -> Result<u64> {
        Ok(self.matching_rows(query).await.len() as u64)
    }

    async fn fetch(&self, query: &SourceQuery<'_>) -> Result<Vec<SourceRow>> {
        let rows = self.matching_rows(query).await;
        let offset = usize::try_from(query.offset).unwrap_or(usize::MAX);
        let limit = query
            .limit
            .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    fn description(&self) -> String {
        "in-memory source".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::query::QuerySpec;

    fn source() -> MemorySource {
        MemorySource::new().with_table(
            "user",
            vec![
                SourceRow::new().with("id", 3),
                SourceRow::new().with("id", 1),
                SourceRow::new().with("id", 2),
            ],
        )
    }

    #[tokio::test]
    async fn test_fetch_orders_and_pages() {
        let spec = QuerySpec::new("user", CursorMode::id());
        let source = source();

        let rows = source
            .fetch(&SourceQuery {
                spec: &spec,
                bound: None,
                offset: 0,
                limit: Some(2),
            })
            .await
            .unwrap();
        let ids: Vec<_> = rows.iter().filter_map(|r| r.get_i64("id")).collect();
        assert_eq!(ids, vec![1, 2]);

        let rows = source
            .fetch(&SourceQuery {
                spec: &spec,
                bound: Some(Bound::Id(2)),
                offset: 0,
                limit: Some(2),
            })
            .await
            .unwrap();
        let ids: Vec<_> = rows.iter().filter_map(|r| r.get_i64("id")).collect();
        assert_eq!(ids, vec![3]);
    }

    #[tokio::test]
    async fn test_timestamp_bound_keeps_ties() {
        let spec = QuerySpec::new("log", CursorMode::timestamp("timecreated"));
        let source = MemorySource::new().with_table(
            "log",
            vec![
                SourceRow::new().with("id", 1).with("timecreated", 100),
                SourceRow::new().with("id", 2).with("timecreated", 100),
                SourceRow::new().with("id", 3).with("timecreated", 50),
            ],
        );

        let query = SourceQuery {
            spec: &spec,
            bound: Some(Bound::Timestamp(100, 1)),
            offset: 0,
            limit: None,
        };
        assert_eq!(source.count(&query).await.unwrap(), 1);
        let rows = source.fetch(&query).await.unwrap();
        assert_eq!(rows[0].get_i64("id"), Some(2));
    }

    #[tokio::test]
    async fn test_table_exists() {
        let source = source();
        assert!(source.table_exists("user").await.unwrap());
        assert!(!source.table_exists("quiz_attempts").await.unwrap());
        source.drop_table("user").await;
        assert!(!source.table_exists("user").await.unwrap());
    }
}
