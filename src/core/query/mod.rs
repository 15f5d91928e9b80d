//! Query provider
//!
//! Every datatype has a static [`QuerySpec`]: a base table, a select list,
//! static joins, base predicates and a [`CursorMode`]. Table references written
//! as `{name}` expand to `<table_prefix><name>` when rendered.
//!
//! Keyset datatypes resume with a strictly-greater predicate on their cursor
//! columns. Grouped (aggregate) datatypes have no stable key to resume on and
//! are paged by offset over the ordered groups.
//!
//! [`QueryProvider`] binds a spec to a [`SourceDatabase`] and exposes the
//! `count` / `fetch` contract used by the orchestrator.

use crate::adapters::database::traits::SourceDatabase;
use crate::core::state::cursor::CursorValue;
use crate::domain::ids::DatatypeName;
use crate::domain::row::{SourceRow, SourceRows};
use crate::domain::{QuarryError, Result};
use regex::Regex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Alias of the base table in every rendered query
pub const BASE_ALIAS: &str = "t";

fn placeholder_pattern() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{([a-z][a-z0-9_]*)\}").expect("placeholder pattern is a valid regex")
    })
}

/// Expand `{name}` table placeholders to prefixed table names
pub fn expand_tables(sql: &str, prefix: &str) -> String {
    placeholder_pattern()
        .replace_all(sql, |caps: &regex::Captures<'_>| format!("{prefix}{}", &caps[1]))
        .into_owned()
}

/// How a datatype resumes between runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorMode {
    /// Forward keyset on the primary key
    Id {
        /// SQL column, e.g. `t.id`
        column: String,
        /// Output key holding the value in each row
        key: String,
    },
    /// Forward keyset on a modification time, ties broken by id
    Timestamp {
        /// SQL time column, e.g. `t.timecreated`
        column: String,
        /// Output key of the time value
        key: String,
        /// SQL id column
        id_column: String,
        /// Output key of the id value
        id_key: String,
    },
    /// Aggregated groups paged by offset, recomputed each run
    Grouped {
        /// SQL grouping expressions, also the sort order
        group_by: Vec<String>,
        /// Output keys matching `group_by`, in the same order
        order_keys: Vec<String>,
    },
}

impl CursorMode {
    /// Keyset on `t.id`
    pub fn id() -> Self {
        Self::Id {
            column: format!("{BASE_ALIAS}.id"),
            key: "id".to_string(),
        }
    }

    /// Keyset on a base-table time column and `t.id`
    pub fn timestamp(column: &str) -> Self {
        Self::Timestamp {
            column: format!("{BASE_ALIAS}.{column}"),
            key: column.to_string(),
            id_column: format!("{BASE_ALIAS}.id"),
            id_key: "id".to_string(),
        }
    }

    /// Groups over base-table columns, output under the same names
    pub fn grouped(columns: &[&str]) -> Self {
        Self::Grouped {
            group_by: columns
                .iter()
                .map(|c| format!("{BASE_ALIAS}.{c}"))
                .collect(),
            order_keys: columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Whether this datatype is an aggregation
    pub fn is_grouped(&self) -> bool {
        matches!(self, Self::Grouped { .. })
    }
}

/// Keyset lower bound, exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    /// Rows with id greater than the value
    Id(i64),
    /// Rows after `(time, id)` in `(time, id)` order
    Timestamp(i64, i64),
}

/// A query resolved against a cursor, ready for a source to execute
#[derive(Debug, Clone, Copy)]
pub struct SourceQuery<'a> {
    /// Query definition
    pub spec: &'a QuerySpec,
    /// Keyset bound, if resuming
    pub bound: Option<Bound>,
    /// Rows (or groups) to skip after the bound
    pub offset: u64,
    /// Maximum rows to return, `None` for all
    pub limit: Option<u64>,
}

/// SQL text plus its bound parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedQuery {
    /// Statement text with `$n` placeholders
    pub sql: String,
    /// Parameter values, in placeholder order
    pub params: Vec<i64>,
}

/// Static query definition of one datatype
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    table: String,
    select: Vec<String>,
    joins: Vec<String>,
    predicates: Vec<String>,
    cursor: CursorMode,
}

impl QuerySpec {
    /// Start a query over `table` (unprefixed)
    pub fn new(table: impl Into<String>, cursor: CursorMode) -> Self {
        Self {
            table: table.into(),
            select: Vec::new(),
            joins: Vec::new(),
            predicates: Vec::new(),
            cursor,
        }
    }

    /// Add select expressions
    pub fn select(mut self, expressions: &[&str]) -> Self {
        self.select
            .extend(expressions.iter().map(|e| e.to_string()));
        self
    }

    /// Add a static join clause
    pub fn join(mut self, clause: impl Into<String>) -> Self {
        self.joins.push(clause.into());
        self
    }

    /// Add a base predicate, combined with AND
    pub fn filter(mut self, predicate: impl Into<String>) -> Self {
        self.predicates.push(predicate.into());
        self
    }

    /// Unprefixed base table name
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Cursor mode
    pub fn cursor_mode(&self) -> &CursorMode {
        &self.cursor
    }

    /// Translate a persisted cursor into a keyset bound and effective offset
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::State`] when the cursor kind does not match the
    /// cursor mode, which happens when a datatype's strategy changed after
    /// its progress was saved.
    pub fn resolve(&self, cursor: Option<&CursorValue>, offset: u64) -> Result<(Option<Bound>, u64)> {
        match (&self.cursor, cursor) {
            (_, None) => Ok((None, offset)),
            (CursorMode::Id { .. }, Some(CursorValue::Id { id })) => {
                Ok((Some(Bound::Id(*id)), offset))
            }
            (CursorMode::Timestamp { .. }, Some(CursorValue::Timestamp { time, id })) => {
                Ok((Some(Bound::Timestamp(*time, *id)), offset))
            }
            (CursorMode::Grouped { .. }, Some(CursorValue::Offset { offset: done })) => {
                Ok((None, done.saturating_add(offset)))
            }
            (mode, Some(other)) => Err(QuarryError::State(format!(
                "Cursor {other} does not match the cursor mode of table '{}' ({mode:?}); reset the datatype",
                self.table
            ))),
        }
    }

    /// Position after `last_row`, given the position before the page
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Schema`] when the row lacks a cursor key.
    pub fn position_after(
        &self,
        previous: Option<&CursorValue>,
        last_row: &SourceRow,
        page_rows: usize,
    ) -> Result<CursorValue> {
        let read = |key: &str| {
            last_row.get_i64(key).ok_or_else(|| {
                QuarryError::Schema(format!(
                    "Row from table '{}' has no integer cursor column '{key}'",
                    self.table
                ))
            })
        };

        match &self.cursor {
            CursorMode::Id { key, .. } => Ok(CursorValue::id(read(key)?)),
            CursorMode::Timestamp { key, id_key, .. } => {
                Ok(CursorValue::timestamp(read(key)?, read(id_key)?))
            }
            CursorMode::Grouped { .. } => {
                let done = match previous {
                    Some(CursorValue::Offset { offset }) => *offset,
                    _ => 0,
                };
                Ok(CursorValue::offset(done + page_rows as u64))
            }
        }
    }

    /// Render the existence probe argument for the base table
    pub fn physical_table(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.table)
    }

    fn from_clause(&self, prefix: &str) -> String {
        let mut sql = format!("FROM {} {BASE_ALIAS}", self.physical_table(prefix));
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(&expand_tables(join, prefix));
        }
        sql
    }

    fn where_clause(&self, prefix: &str, bound: Option<Bound>, params: &mut Vec<i64>) -> String {
        let mut conditions: Vec<String> = self
            .predicates
            .iter()
            .map(|p| format!("({})", expand_tables(p, prefix)))
            .collect();

        match (bound, &self.cursor) {
            (Some(Bound::Id(id)), CursorMode::Id { column, .. }) => {
                params.push(id);
                conditions.push(format!("{column} > ${}::bigint", params.len()));
            }
            (
                Some(Bound::Timestamp(time, id)),
                CursorMode::Timestamp {
                    column, id_column, ..
                },
            ) => {
                params.push(time);
                let t = params.len();
                params.push(id);
                let i = params.len();
                conditions.push(format!(
                    "({column} > ${t}::bigint OR ({column} = ${t}::bigint AND {id_column} > ${i}::bigint))"
                ));
            }
            _ => {}
        }

        if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        }
    }

    fn order_clause(&self) -> String {
        match &self.cursor {
            CursorMode::Id { column, .. } => format!(" ORDER BY {column}"),
            CursorMode::Timestamp {
                column, id_column, ..
            } => format!(" ORDER BY {column}, {id_column}"),
            CursorMode::Grouped { group_by, .. } => {
                let keys = group_by.join(", ");
                format!(" GROUP BY {keys} ORDER BY {keys}")
            }
        }
    }

    /// Render the count statement
    pub fn render_count(&self, prefix: &str, bound: Option<Bound>) -> RenderedQuery {
        let mut params = Vec::new();
        let from = self.from_clause(prefix);
        let filter = self.where_clause(prefix, bound, &mut params);

        let sql = match &self.cursor {
            CursorMode::Grouped { group_by, .. } => format!(
                "SELECT COUNT(*) FROM (SELECT 1 {from}{filter} GROUP BY {}) g",
                group_by.join(", ")
            ),
            _ => format!("SELECT COUNT(*) {from}{filter}"),
        };

        RenderedQuery { sql, params }
    }

    /// Render the page statement
    pub fn render_fetch(&self, prefix: &str, query: &SourceQuery<'_>) -> RenderedQuery {
        let mut params = Vec::new();
        let columns = if self.select.is_empty() {
            format!("{BASE_ALIAS}.*")
        } else {
            expand_tables(&self.select.join(", "), prefix)
        };

        let mut sql = format!(
            "SELECT {columns} {}{}{}",
            self.from_clause(prefix),
            self.where_clause(prefix, query.bound, &mut params),
            self.order_clause()
        );

        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit.min(i64::MAX as u64)));
        }
        if query.offset > 0 {
            sql.push_str(&format!(" OFFSET {}", query.offset));
        }

        RenderedQuery { sql, params }
    }
}

/// Binds one datatype's query to a source database
///
/// Implements the `count(cursor)` / `fetch(cursor, offset, limit)` contract,
/// reporting a missing base table as [`QuarryError::NotMigratable`] rather
/// than as zero rows.
pub struct QueryProvider {
    datatype: DatatypeName,
    spec: QuerySpec,
    source: Arc<dyn SourceDatabase>,
    table_verified: AtomicBool,
}

impl QueryProvider {
    /// Create a provider for `datatype`
    pub fn new(datatype: DatatypeName, spec: QuerySpec, source: Arc<dyn SourceDatabase>) -> Self {
        Self {
            datatype,
            spec,
            source,
            table_verified: AtomicBool::new(false),
        }
    }

    /// Query definition
    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    async fn ensure_migratable(&self) -> Result<()> {
        if self.table_verified.load(Ordering::Relaxed) {
            return Ok(());
        }

        if !self.source.table_exists(self.spec.table()).await? {
            return Err(QuarryError::NotMigratable {
                datatype: self.datatype.to_string(),
                table: self.spec.table().to_string(),
            });
        }

        self.table_verified.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Number of rows (or groups) remaining after `cursor`
    pub async fn count(&self, cursor: Option<&CursorValue>) -> Result<u64> {
        self.ensure_migratable().await?;
        let (bound, skipped) = self.spec.resolve(cursor, 0)?;
        let total = self
            .source
            .count(&SourceQuery {
                spec: &self.spec,
                bound,
                offset: 0,
                limit: None,
            })
            .await?;
        Ok(total.saturating_sub(skipped))
    }

    /// Fetch one page after `cursor`
    pub async fn fetch(
        &self,
        cursor: Option<&CursorValue>,
        offset: u64,
        limit: Option<u64>,
    ) -> Result<SourceRows> {
        self.ensure_migratable().await?;
        let (bound, offset) = self.spec.resolve(cursor, offset)?;
        let rows = self
            .source
            .fetch(&SourceQuery {
                spec: &self.spec,
                bound,
                offset,
                limit,
            })
            .await?;

        tracing::debug!(
            datatype = %self.datatype,
            rows = rows.len(),
            offset,
            "Fetched source page"
        );

        Ok(SourceRows::new(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemorySource;

    fn users() -> QuerySpec {
        QuerySpec::new("user", CursorMode::id())
            .select(&["t.id", "t.username", "t.firstname"])
            .filter("t.deleted = 0")
    }

    #[test]
    fn test_expand_tables() {
        assert_eq!(
            expand_tables("JOIN {grade_items} gi ON gi.id = t.itemid", "mdl_"),
            "JOIN mdl_grade_items gi ON gi.id = t.itemid"
        );
        assert_eq!(expand_tables("t.id > 0", "mdl_"), "t.id > 0");
    }

    #[test]
    fn test_render_id_fetch_without_cursor() {
        let spec = users();
        let query = SourceQuery {
            spec: &spec,
            bound: None,
            offset: 0,
            limit: Some(2),
        };
        let rendered = spec.render_fetch("mdl_", &query);
        assert_eq!(
            rendered.sql,
            "SELECT t.id, t.username, t.firstname FROM mdl_user t WHERE (t.deleted = 0) ORDER BY t.id LIMIT 2"
        );
        assert!(rendered.params.is_empty());
    }

    #[test]
    fn test_render_id_fetch_with_cursor() {
        let spec = users();
        let query = SourceQuery {
            spec: &spec,
            bound: Some(Bound::Id(2)),
            offset: 0,
            limit: Some(2),
        };
        let rendered = spec.render_fetch("mdl_", &query);
        assert!(rendered
            .sql
            .contains("WHERE (t.deleted = 0) AND t.id > $1::bigint ORDER BY t.id"));
        assert_eq!(rendered.params, vec![2]);
    }

    #[test]
    fn test_render_timestamp_cursor() {
        let spec = QuerySpec::new("logstore_standard_log", CursorMode::timestamp("timecreated"));
        let rendered = spec.render_count("mdl_", Some(Bound::Timestamp(100, 7)));
        assert_eq!(
            rendered.sql,
            "SELECT COUNT(*) FROM mdl_logstore_standard_log t WHERE (t.timecreated > $1::bigint OR (t.timecreated = $1::bigint AND t.id > $2::bigint))"
        );
        assert_eq!(rendered.params, vec![100, 7]);
    }

    #[test]
    fn test_render_grouped() {
        let spec = QuerySpec::new("logstore_standard_log", CursorMode::grouped(&["userid", "contextid"]))
            .select(&["t.userid", "t.contextid", "COUNT(*) AS views"]);

        let count = spec.render_count("mdl_", None);
        assert_eq!(
            count.sql,
            "SELECT COUNT(*) FROM (SELECT 1 FROM mdl_logstore_standard_log t GROUP BY t.userid, t.contextid) g"
        );

        let query = SourceQuery {
            spec: &spec,
            bound: None,
            offset: 4,
            limit: Some(2),
        };
        let fetch = spec.render_fetch("mdl_", &query);
        assert!(fetch
            .sql
            .ends_with("GROUP BY t.userid, t.contextid ORDER BY t.userid, t.contextid LIMIT 2 OFFSET 4"));
    }

    #[test]
    fn test_resolve_matches_modes() {
        let spec = users();
        assert_eq!(spec.resolve(None, 0).unwrap(), (None, 0));
        assert_eq!(
            spec.resolve(Some(&CursorValue::id(5)), 0).unwrap(),
            (Some(Bound::Id(5)), 0)
        );
        assert!(matches!(
            spec.resolve(Some(&CursorValue::offset(5)), 0),
            Err(QuarryError::State(_))
        ));

        let grouped = QuerySpec::new("log", CursorMode::grouped(&["userid"]));
        assert_eq!(
            grouped.resolve(Some(&CursorValue::offset(10)), 2).unwrap(),
            (None, 12)
        );
    }

    #[test]
    fn test_position_after() {
        let row = SourceRow::new().with("id", 3).with("timecreated", 900);

        assert_eq!(
            users().position_after(None, &row, 1).unwrap(),
            CursorValue::id(3)
        );

        let log = QuerySpec::new("log", CursorMode::timestamp("timecreated"));
        assert_eq!(
            log.position_after(None, &row, 1).unwrap(),
            CursorValue::timestamp(900, 3)
        );

        let grouped = QuerySpec::new("log", CursorMode::grouped(&["userid"]));
        assert_eq!(
            grouped
                .position_after(Some(&CursorValue::offset(4)), &row, 2)
                .unwrap(),
            CursorValue::offset(6)
        );

        let missing = SourceRow::new().with("username", "ada");
        assert!(users().position_after(None, &missing, 1).is_err());
    }

    /// `count` must agree with what `fetch` yields, whole and paged
    async fn assert_count_matches_fetch(
        spec: QuerySpec,
        rows: Vec<SourceRow>,
        resume: CursorValue,
    ) {
        let source = MemorySource::new().with_table(spec.table().to_string(), rows);
        let provider =
            QueryProvider::new(DatatypeName::new("sample").unwrap(), spec, Arc::new(source));

        let total = provider.count(None).await.unwrap();
        let drained = provider.fetch(None, 0, None).await.unwrap().count() as u64;
        assert_eq!(total, drained);
        assert!(total > 0);

        let mut position: Option<CursorValue> = None;
        let mut paged = 0u64;
        loop {
            let page: Vec<SourceRow> = provider
                .fetch(position.as_ref(), 0, Some(2))
                .await
                .unwrap()
                .collect();
            let Some(last) = page.last() else {
                break;
            };
            position = Some(
                provider
                    .spec()
                    .position_after(position.as_ref(), last, page.len())
                    .unwrap(),
            );
            paged += page.len() as u64;
        }
        assert_eq!(paged, total);

        let remaining = provider.count(Some(&resume)).await.unwrap();
        let drained = provider.fetch(Some(&resume), 0, None).await.unwrap().count() as u64;
        assert_eq!(remaining, drained);
        assert!(remaining < total);
    }

    #[tokio::test]
    async fn test_count_matches_fetch_for_id_cursor() {
        let rows = [5, 1, 4, 2, 3]
            .into_iter()
            .map(|id| SourceRow::new().with("id", id).with("username", format!("u{id}")))
            .collect();
        assert_count_matches_fetch(users(), rows, CursorValue::id(2)).await;
    }

    #[tokio::test]
    async fn test_count_matches_fetch_for_timestamp_cursor() {
        let rows = [(4, 100), (2, 100), (3, 100), (1, 90), (5, 120)]
            .into_iter()
            .map(|(id, time)| SourceRow::new().with("id", id).with("timecreated", time))
            .collect();
        let spec = QuerySpec::new("logstore_standard_log", CursorMode::timestamp("timecreated"));
        assert_count_matches_fetch(spec, rows, CursorValue::timestamp(100, 2)).await;
    }

    #[tokio::test]
    async fn test_count_matches_fetch_for_grouped_cursor() {
        let rows = [(2, 50), (1, 51), (1, 50), (3, 50), (2, 51)]
            .into_iter()
            .map(|(userid, contextid)| {
                SourceRow::new()
                    .with("userid", userid)
                    .with("contextid", contextid)
                    .with("views", 1)
            })
            .collect();
        let spec = QuerySpec::new("logstore_standard_log", CursorMode::grouped(&["userid", "contextid"]));
        assert_count_matches_fetch(spec, rows, CursorValue::offset(3)).await;
    }
}
