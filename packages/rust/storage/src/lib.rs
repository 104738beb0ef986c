//! libSQL storage layer for checkpoints and session history.
//!
//! The [`Storage`] struct wraps a local libSQL database. Checkpoints are keyed
//! by session and overwritten on every write; history records are append-only.
//! Payloads are stored as JSON text next to a few indexed columns used for
//! listings.

mod migrations;

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use fitscout_shared::{
    Checkpoint, CheckpointSummary, FitScoutError, HistoryId, HistoryRecord, HistorySummary, Result,
    SessionId, SessionStatus,
};
use libsql::{Connection, Database, params};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    path: PathBuf,
}

fn storage_err(e: impl std::fmt::Display) -> FitScoutError {
    FitScoutError::Storage(e.to_string())
}

/// Fixed-width UTC timestamps so text ordering matches time ordering.
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| FitScoutError::Storage(format!("bad timestamp '{s}': {e}")))
}

fn parse_status(s: &str) -> Result<SessionStatus> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|e| FitScoutError::Storage(format!("bad session status '{s}': {e}")))
}

fn parse_id<T: std::str::FromStr>(s: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    s.parse()
        .map_err(|e| FitScoutError::Storage(format!("bad id '{s}': {e}")))
}

impl Storage {
    /// Open or create a database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FitScoutError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let conn = db.connect().map_err(storage_err)?;

        let storage = Self {
            db,
            conn,
            path: path.to_path_buf(),
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Path of the underlying database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        FitScoutError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Checkpoints
    // -----------------------------------------------------------------------

    /// Write (or overwrite) the checkpoint for its session.
    /// Returns a location string identifying where it was stored.
    pub async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<String> {
        let state = &checkpoint.state;
        let session_id = state.session_id.to_string();
        let payload = serde_json::to_string(checkpoint)?;

        self.conn
            .execute(
                "INSERT INTO checkpoints
                   (session_id, saved_at, status, range_start, range_end, processed_count,
                    catalog_fingerprint, state_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(session_id) DO UPDATE SET
                   saved_at = excluded.saved_at,
                   status = excluded.status,
                   range_start = excluded.range_start,
                   range_end = excluded.range_end,
                   processed_count = excluded.processed_count,
                   catalog_fingerprint = excluded.catalog_fingerprint,
                   state_json = excluded.state_json",
                params![
                    session_id.as_str(),
                    timestamp(&checkpoint.saved_at),
                    state.status.to_string(),
                    state.range_start as i64,
                    state.range_end as i64,
                    state.processed_count as i64,
                    state.catalog_fingerprint.as_str(),
                    payload,
                ],
            )
            .await
            .map_err(storage_err)?;

        tracing::debug!(
            session_id = %state.session_id,
            processed = state.processed_count,
            "checkpoint saved"
        );
        Ok(format!("{}#checkpoints/{session_id}", self.path.display()))
    }

    /// Load the checkpoint for `session_id`, if one exists.
    pub async fn load_checkpoint(&self, session_id: &SessionId) -> Result<Option<Checkpoint>> {
        let mut rows = self
            .conn
            .query(
                "SELECT state_json FROM checkpoints WHERE session_id = ?1",
                params![session_id.to_string()],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => {
                let json = row.get::<String>(0).map_err(storage_err)?;
                Ok(Some(Checkpoint::from_json(&json)?))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// All checkpoints, most recently saved first.
    pub async fn list_checkpoints(&self) -> Result<Vec<CheckpointSummary>> {
        let mut rows = self
            .conn
            .query(
                "SELECT session_id, saved_at, status, range_start, range_end, processed_count
                 FROM checkpoints
                 ORDER BY saved_at DESC, session_id DESC",
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let range_start = row.get::<i64>(3).map_err(storage_err)? as usize;
            let range_end = row.get::<i64>(4).map_err(storage_err)? as usize;
            let processed_count = row.get::<i64>(5).map_err(storage_err)? as usize;
            let len = range_end.saturating_sub(range_start);
            let progress_percentage = if len == 0 {
                100.0
            } else {
                (processed_count as f64 / len as f64 * 100.0).min(100.0)
            };

            results.push(CheckpointSummary {
                session_id: parse_id(&row.get::<String>(0).map_err(storage_err)?)?,
                saved_at: parse_timestamp(&row.get::<String>(1).map_err(storage_err)?)?,
                status: parse_status(&row.get::<String>(2).map_err(storage_err)?)?,
                range_start,
                range_end,
                processed_count,
                progress_percentage,
            });
        }
        Ok(results)
    }

    /// Delete a checkpoint. Returns whether one existed.
    pub async fn delete_checkpoint(&self, session_id: &SessionId) -> Result<bool> {
        let affected = self
            .conn
            .execute(
                "DELETE FROM checkpoints WHERE session_id = ?1",
                params![session_id.to_string()],
            )
            .await
            .map_err(storage_err)?;
        Ok(affected > 0)
    }

    // -----------------------------------------------------------------------
    // History
    // -----------------------------------------------------------------------

    /// Archive a finished session. History records are never updated.
    pub async fn append_history(&self, record: &HistoryRecord) -> Result<()> {
        let summary_json = serde_json::to_string(&record.summary())?;
        let record_json = serde_json::to_string(record)?;

        self.conn
            .execute(
                "INSERT INTO history (id, session_id, outcome, recorded_at, summary_json, record_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.id.to_string(),
                    record.session_id.to_string(),
                    record.outcome.to_string(),
                    timestamp(&record.recorded_at),
                    summary_json,
                    record_json,
                ],
            )
            .await
            .map_err(storage_err)?;

        tracing::debug!(id = %record.id, session_id = %record.session_id, "history appended");
        Ok(())
    }

    /// Full history record by id.
    pub async fn get_history(&self, id: &HistoryId) -> Result<Option<HistoryRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT record_json FROM history WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => {
                let json = row.get::<String>(0).map_err(storage_err)?;
                Ok(Some(serde_json::from_str(&json)?))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Up to `limit` history summaries, newest first.
    pub async fn list_history(&self, limit: usize) -> Result<Vec<HistorySummary>> {
        let mut rows = self
            .conn
            .query(
                "SELECT summary_json FROM history
                 ORDER BY recorded_at DESC, id DESC
                 LIMIT ?1",
                params![limit as i64],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let json = row.get::<String>(0).map_err(storage_err)?;
            results.push(serde_json::from_str(&json)?);
        }
        Ok(results)
    }

    /// Delete a history record. Returns whether one existed.
    pub async fn delete_history(&self, id: &HistoryId) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM history WHERE id = ?1", params![id.to_string()])
            .await
            .map_err(storage_err)?;
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fitscout_shared::{
        Catalog, EnrichedResult, HistoryOutcome, Makes, PartRecord, SessionState,
    };
    use uuid::Uuid;

    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("fitscout_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.unwrap()
    }

    fn sample_catalog() -> Catalog {
        Catalog {
            automotive: (0..20)
                .map(|i| PartRecord::new(i, format!("ACME_{i}"), "filter", 2, 1.0, 2.0))
                .collect(),
            tools: vec![PartRecord::new(0, "TOOL_1", "wrench", 1, 9.0, 9.0)],
            unknown: Vec::new(),
        }
    }

    fn sample_state(catalog: &Catalog, processed: usize) -> SessionState {
        let mut state = SessionState::new(0, 20, catalog.fingerprint());
        for i in 0..processed {
            let makes = if i % 2 == 0 {
                Makes::Found(vec!["Ford".into()])
            } else {
                Makes::NotFound
            };
            state.record(EnrichedResult::new(i, catalog.automotive[i].clone(), makes, "RockAuto"));
        }
        state
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 2);
        assert!(storage.list_checkpoints().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("fitscout_test_{}.db", Uuid::now_v7()));
        let _s1 = Storage::open(&tmp).await.unwrap();
        drop(_s1);
        let s2 = Storage::open(&tmp).await.unwrap();
        assert_eq!(s2.get_schema_version().await, 2);
    }

    #[tokio::test]
    async fn checkpoint_save_load_overwrite() {
        let storage = test_storage().await;
        let catalog = sample_catalog();
        let state = sample_state(&catalog, 4);
        let session_id = state.session_id;

        let location = storage
            .save_checkpoint(&Checkpoint::new(state, catalog.clone()))
            .await
            .unwrap();
        assert!(location.ends_with(&format!("#checkpoints/{session_id}")));

        let mut state = sample_state(&catalog, 10);
        state.session_id = session_id;
        state.set_status(SessionStatus::Stopped);
        storage
            .save_checkpoint(&Checkpoint::new(state.clone(), catalog.clone()))
            .await
            .unwrap();

        let loaded = storage.load_checkpoint(&session_id).await.unwrap().unwrap();
        assert_eq!(loaded.state.processed_count, 10);
        assert_eq!(loaded.state.status, SessionStatus::Stopped);
        assert_eq!(loaded.state.result_log, state.result_log);
        assert_eq!(loaded.state.leaderboard.get("Ford").unwrap().occurrence_count, 5);
        assert_eq!(loaded.catalog, catalog);

        let list = storage.list_checkpoints().await.unwrap();
        assert_eq!(list.len(), 1);
        assert!((list[0].progress_percentage - 50.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn checkpoints_listed_newest_first() {
        let storage = test_storage().await;
        let catalog = sample_catalog();

        let mut older = Checkpoint::new(sample_state(&catalog, 1), catalog.clone());
        older.saved_at = Utc::now() - chrono::Duration::minutes(5);
        let newer = Checkpoint::new(sample_state(&catalog, 2), catalog.clone());

        storage.save_checkpoint(&newer).await.unwrap();
        storage.save_checkpoint(&older).await.unwrap();

        let list = storage.list_checkpoints().await.unwrap();
        assert_eq!(list[0].session_id, newer.state.session_id);
        assert_eq!(list[1].session_id, older.state.session_id);
    }

    #[tokio::test]
    async fn missing_and_deleted_checkpoints() {
        let storage = test_storage().await;
        let catalog = sample_catalog();
        let checkpoint = Checkpoint::new(sample_state(&catalog, 3), catalog);
        let id = checkpoint.state.session_id;

        assert!(storage.load_checkpoint(&SessionId::new()).await.unwrap().is_none());
        storage.save_checkpoint(&checkpoint).await.unwrap();
        assert!(storage.delete_checkpoint(&id).await.unwrap());
        assert!(!storage.delete_checkpoint(&id).await.unwrap());
        assert!(storage.load_checkpoint(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn history_append_list_get_delete() {
        let storage = test_storage().await;
        let catalog = sample_catalog();
        let state = sample_state(&catalog, 6);

        let first = HistoryRecord::from_state(&state, &catalog, HistoryOutcome::Stopped);
        let mut second = HistoryRecord::from_state(&state, &catalog, HistoryOutcome::Completed);
        second.recorded_at = first.recorded_at + chrono::Duration::seconds(1);

        storage.append_history(&first).await.unwrap();
        storage.append_history(&second).await.unwrap();

        let list = storage.list_history(50).await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, second.id);
        assert_eq!(list[1].summary.successful_lookups, 3);
        assert_eq!(storage.list_history(1).await.unwrap().len(), 1);

        let loaded = storage.get_history(&first.id).await.unwrap().unwrap();
        assert_eq!(loaded, first);
        assert_eq!(loaded.catalog_counts.tools, 1);

        assert!(storage.delete_history(&first.id).await.unwrap());
        assert!(storage.get_history(&first.id).await.unwrap().is_none());
        assert!(!storage.delete_history(&first.id).await.unwrap());
    }
}
