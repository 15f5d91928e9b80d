//! Adapter factory
//!
//! This module builds the adapter behind each trait from configuration.
//! Dry runs get in-memory state and artifacts so nothing is persisted; the
//! source database is always the real one.

use crate::adapters::database::traits::{
    ArtifactStore, CompletionNotifier, SourceDatabase, StateStorage,
};
use crate::adapters::filesystem::{FileArtifactStore, FileStateStorage, LogNotifier, ManifestNotifier};
use crate::adapters::memory::{MemoryArtifactStore, MemoryStateStorage};
use crate::adapters::postgresql::{PoolSettings, PostgresClient, PostgresSource, PostgresStateStorage};
use crate::config::{QuarryConfig, SourceConfig, StateBackend};
use crate::domain::{QuarryError, Result};
use std::sync::Arc;

/// Create the source database adapter
///
/// # Errors
///
/// Returns an error if the connection string is invalid or the pool cannot be
/// built. No connection is opened here.
pub async fn create_source(config: &SourceConfig) -> Result<Arc<dyn SourceDatabase>> {
    let source = PostgresSource::from_config(config)?;
    tracing::info!(source = %source.description(), "Source database configured");
    Ok(Arc::new(source))
}

/// Create the export log backend
///
/// # Errors
///
/// Returns an error if the PostgreSQL backend cannot connect or create its
/// tables.
pub async fn create_state_storage(config: &QuarryConfig) -> Result<Arc<dyn StateStorage>> {
    if config.application.dry_run {
        tracing::info!("DRY RUN: export log kept in memory");
        return Ok(Arc::new(MemoryStateStorage::new()));
    }

    match config.state.backend {
        StateBackend::File => {
            let storage = FileStateStorage::new(&config.state.path);
            tracing::info!(path = %storage.path().display(), "Using file export log");
            Ok(Arc::new(storage))
        }
        StateBackend::PostgreSQL => {
            let connection_string = config.state.connection_string.as_ref().ok_or_else(|| {
                QuarryError::Configuration(
                    "state.connection_string is required for the postgresql backend".to_string(),
                )
            })?;
            let settings = PoolSettings {
                max_connections: 2,
                connection_timeout_seconds: config.source.connection_timeout_seconds,
                statement_timeout_seconds: config.source.statement_timeout_seconds,
            };
            let client = Arc::new(PostgresClient::new(connection_string, &settings)?);
            tracing::info!(
                dsn = %client.connection_string_safe(),
                table = %config.state.table,
                "Using PostgreSQL export log"
            );
            Ok(Arc::new(
                PostgresStateStorage::connect(client, config.state.table.clone()).await?,
            ))
        }
    }
}

/// Create the artifact store
pub fn create_artifact_store(config: &QuarryConfig) -> Result<Arc<dyn ArtifactStore>> {
    if config.application.dry_run {
        tracing::info!("DRY RUN: artifacts kept in memory");
        return Ok(Arc::new(MemoryArtifactStore::new()));
    }

    let store = FileArtifactStore::new(&config.export.output_dir);
    tracing::info!(dir = %store.dir().display(), "Writing artifacts");
    Ok(Arc::new(store))
}

/// Create the completion sink
pub fn create_notifier(config: &QuarryConfig) -> Arc<dyn CompletionNotifier> {
    if config.application.dry_run {
        Arc::new(LogNotifier)
    } else {
        Arc::new(ManifestNotifier::new(&config.export.output_dir))
    }
}
