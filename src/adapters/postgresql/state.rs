//! PostgreSQL export log storage
//!
//! Cursors are stored as JSONB documents keyed by datatype in the configured
//! table; the resume pointer lives in a single-row companion table
//! `<table>_pointer`. Both tables are created on connect if missing.
//!
//! A run claims the log with a session-level advisory lock held on a
//! connection detached from the pool, so two hosts sharing one table cannot
//! export at the same time.

use crate::adapters::database::traits::{RunLease, StateStorage};
use crate::adapters::postgresql::client::PostgresClient;
use crate::core::state::cursor::ExportCursor;
use crate::domain::ids::DatatypeName;
use crate::domain::{QuarryError, Result};
use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Export log kept in PostgreSQL
pub struct PostgresStateStorage {
    client: Arc<PostgresClient>,
    table: String,
}

impl PostgresStateStorage {
    /// Connect and make sure the state tables exist
    ///
    /// `table` must be a plain identifier; configuration validation
    /// guarantees this.
    pub async fn connect(client: Arc<PostgresClient>, table: impl Into<String>) -> Result<Self> {
        let storage = Self {
            client,
            table: table.into(),
        };
        storage.ensure_schema().await?;
        Ok(storage)
    }

    fn pointer_table(&self) -> String {
        format!("{}_pointer", self.table)
    }

    async fn ensure_schema(&self) -> Result<()> {
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                datatype TEXT PRIMARY KEY,
                cursor JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            CREATE TABLE IF NOT EXISTS {pointer} (
                id SMALLINT PRIMARY KEY CHECK (id = 1),
                last_completed TEXT
            );
            "#,
            table = self.table,
            pointer = self.pointer_table()
        );
        self.client.batch_execute(&ddl).await?;
        tracing::debug!(table = %self.table, "Export log tables ready");
        Ok(())
    }

    /// Advisory lock key of an export log table
    fn lease_key(table: &str) -> i64 {
        let digest = Sha256::digest(format!("quarry:{table}").as_bytes());
        let mut key = [0u8; 8];
        key.copy_from_slice(&digest[..8]);
        i64::from_be_bytes(key)
    }

    fn decode(value: Value) -> Result<ExportCursor> {
        serde_json::from_value(value)
            .map_err(|e| QuarryError::State(format!("Stored cursor is corrupt: {e}")))
    }
}

#[async_trait]
impl StateStorage for PostgresStateStorage {
    async fn load_cursor(&self, datatype: &DatatypeName) -> Result<Option<ExportCursor>> {
        let query = format!("SELECT cursor FROM {} WHERE datatype = $1", self.table);
        let rows = self.client.query(&query, &[&datatype.as_str()]).await?;
        rows.first()
            .map(|row| Self::decode(row.get::<_, Value>(0)))
            .transpose()
    }

    async fn save_cursor(&self, cursor: &ExportCursor) -> Result<()> {
        let document = serde_json::to_value(cursor)?;
        let upsert = format!(
            r#"
            INSERT INTO {} (datatype, cursor, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (datatype) DO UPDATE SET
                cursor = EXCLUDED.cursor,
                updated_at = EXCLUDED.updated_at
            "#,
            self.table
        );
        self.client
            .execute(&upsert, &[&cursor.datatype.as_str(), &document])
            .await
            .map_err(|e| QuarryError::State(format!("Failed to save cursor: {e}")))?;

        tracing::trace!(datatype = %cursor.datatype, "Cursor saved to PostgreSQL");
        Ok(())
    }

    async fn delete_cursor(&self, datatype: &DatatypeName) -> Result<()> {
        let statement = format!("DELETE FROM {} WHERE datatype = $1", self.table);
        self.client.execute(&statement, &[&datatype.as_str()]).await?;
        Ok(())
    }

    async fn list_cursors(&self) -> Result<Vec<ExportCursor>> {
        let query = format!("SELECT cursor FROM {} ORDER BY datatype", self.table);
        let rows = self.client.query(&query, &[]).await?;
        rows.iter()
            .map(|row| Self::decode(row.get::<_, Value>(0)))
            .collect()
    }

    async fn load_last_completed(&self) -> Result<Option<DatatypeName>> {
        let query = format!(
            "SELECT last_completed FROM {} WHERE id = 1",
            self.pointer_table()
        );
        let rows = self.client.query(&query, &[]).await?;
        let Some(name) = rows.first().and_then(|row| row.get::<_, Option<String>>(0)) else {
            return Ok(None);
        };
        DatatypeName::new(name)
            .map(Some)
            .map_err(|e| QuarryError::State(format!("Stored resume pointer is invalid: {e}")))
    }

    async fn save_last_completed(&self, datatype: Option<&DatatypeName>) -> Result<()> {
        let upsert = format!(
            r#"
            INSERT INTO {} (id, last_completed)
            VALUES (1, $1)
            ON CONFLICT (id) DO UPDATE SET last_completed = EXCLUDED.last_completed
            "#,
            self.pointer_table()
        );
        let name = datatype.map(DatatypeName::as_str);
        self.client.execute(&upsert, &[&name]).await?;
        Ok(())
    }

    async fn acquire_lease(&self) -> Result<Option<RunLease>> {
        let key = Self::lease_key(&self.table);
        let connection = self.client.get_connection().await?;
        let row = connection
            .query_one("SELECT pg_try_advisory_lock($1)", &[&key])
            .await
            .map_err(|e| QuarryError::State(format!("Failed to claim export log: {e}")))?;

        if !row.get::<_, bool>(0) {
            return Err(QuarryError::ConcurrencyViolation(format!(
                "export log table {} is claimed by another run (advisory lock {key})",
                self.table
            )));
        }

        // off the pool, the session ends with the lease and takes the lock with it
        let session = deadpool_postgres::Object::take(connection);
        tracing::debug!(table = %self.table, key, "Export log claimed");
        Ok(Some(RunLease::new(session)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_key_is_stable_per_table() {
        let key = PostgresStateStorage::lease_key("quarry_export_log");
        assert_eq!(key, PostgresStateStorage::lease_key("quarry_export_log"));
        assert_ne!(key, PostgresStateStorage::lease_key("other_export_log"));
    }
}
