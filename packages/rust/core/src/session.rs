//! Session state machine: start, stop, resume, status and export of one
//! enrichment run at a time.
//!
//! All session state lives behind one async mutex. The worker task takes the
//! lock only for short bookkeeping sections, never across a page fetch.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use fitscout_extractor::{FetcherFactory, MakeExtractor};
use fitscout_shared::{
    Catalog, CategoryCounts, CheckpointSummary, EnrichedResult, FitScoutError, HistoryId,
    HistoryRecord, HistorySummary, LeaderboardEntry, Result, SessionConfig, SessionId,
    SessionState, SessionStatus,
};
use fitscout_storage::Storage;

use crate::events::EventSink;
use crate::export::{ExportRow, build_export};
use crate::history::HistoryIndex;
use crate::worker;

// ---------------------------------------------------------------------------
// Shared context
// ---------------------------------------------------------------------------

/// Mutable data guarded by the session lock.
pub(crate) struct Inner {
    pub catalog: Option<Catalog>,
    pub session: Option<SessionState>,
    pub history: HistoryIndex,
    pub worker: Option<JoinHandle<()>>,
}

/// Everything the manager and its worker share.
pub(crate) struct SessionContext<F: FetcherFactory> {
    pub inner: Mutex<Inner>,
    pub storage: Arc<Storage>,
    pub factory: F,
    pub extractor: MakeExtractor,
    pub sink: Arc<dyn EventSink>,
    pub config: SessionConfig,
    pub stop_flag: AtomicBool,
}

// ---------------------------------------------------------------------------
// Status snapshot
// ---------------------------------------------------------------------------

/// Point-in-time view of the manager for status queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    pub range_start: usize,
    pub range_end: usize,
    pub processed_count: usize,
    pub successful_lookups: usize,
    pub total_automotive: usize,
    /// Fraction in `[0, 1]`.
    pub success_rate: f64,
    pub progress_percentage: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub has_data: bool,
}

// ---------------------------------------------------------------------------
// SessionManager
// ---------------------------------------------------------------------------

/// Drives at most one enrichment session at a time.
pub struct SessionManager<F: FetcherFactory> {
    ctx: Arc<SessionContext<F>>,
}

impl<F: FetcherFactory> SessionManager<F> {
    /// Build a manager and seed its history index from storage.
    pub async fn new(
        storage: Arc<Storage>,
        factory: F,
        extractor: MakeExtractor,
        sink: Arc<dyn EventSink>,
        config: SessionConfig,
    ) -> Result<Self> {
        let recent = storage.list_history(config.history_limit).await?;
        let history = HistoryIndex::with_entries(config.history_limit, recent);

        Ok(Self {
            ctx: Arc::new(SessionContext {
                inner: Mutex::new(Inner {
                    catalog: None,
                    session: None,
                    history,
                    worker: None,
                }),
                storage,
                factory,
                extractor,
                sink,
                config,
                stop_flag: AtomicBool::new(false),
            }),
        })
    }

    /// Replace the loaded catalog. Any finished session is discarded.
    pub async fn load_catalog(&self, catalog: Catalog) -> Result<CategoryCounts> {
        let mut inner = self.ctx.inner.lock().await;
        if is_active(&inner) {
            return Err(FitScoutError::AlreadyRunning);
        }
        let counts = catalog.counts();
        info!(
            automotive = counts.automotive,
            tools = counts.tools,
            unknown = counts.unknown,
            "catalog loaded"
        );
        inner.catalog = Some(catalog);
        inner.session = None;
        Ok(counts)
    }

    /// Start a new session over `[range_start, range_end)` of the automotive list.
    pub async fn start(&self, range_start: usize, range_end: usize) -> Result<SessionId> {
        let mut inner = self.ctx.inner.lock().await;
        if is_active(&inner) {
            return Err(FitScoutError::AlreadyRunning);
        }
        let Some(catalog) = inner.catalog.as_ref() else {
            return Err(FitScoutError::NoDataLoaded);
        };

        let total = catalog.total_automotive();
        if range_end <= range_start || range_end > total {
            return Err(FitScoutError::InvalidRange {
                start: range_start,
                end: range_end,
                total,
            });
        }

        let state = SessionState::new(range_start, range_end, catalog.fingerprint());
        let session_id = state.session_id;
        info!(%session_id, range_start, range_end, total, "starting session");

        inner.session = Some(state);
        self.spawn_worker(&mut inner, session_id);
        Ok(session_id)
    }

    /// Start over the first `test_batch_size` automotive parts.
    pub async fn start_test_batch(&self) -> Result<SessionId> {
        let total = {
            let inner = self.ctx.inner.lock().await;
            match inner.catalog.as_ref() {
                Some(catalog) => catalog.total_automotive(),
                None => return Err(FitScoutError::NoDataLoaded),
            }
        };
        self.start(0, total.min(self.ctx.config.test_batch_size))
            .await
    }

    /// Ask the running session to stop after its in-flight record.
    ///
    /// Returns `false` (and does nothing) when no session is running.
    pub async fn stop(&self) -> bool {
        let mut inner = self.ctx.inner.lock().await;
        match inner.session.as_mut() {
            Some(state) if state.status == SessionStatus::Running => {
                state.set_status(SessionStatus::StopRequested);
                self.ctx.stop_flag.store(true, Ordering::Release);
                info!(session_id = %state.session_id, processed = state.processed_count, "stop requested");
                true
            }
            _ => false,
        }
    }

    /// Resume a checkpointed session where it left off.
    pub async fn resume(&self, session_id: &SessionId) -> Result<()> {
        let mut inner = self.ctx.inner.lock().await;
        if is_active(&inner) {
            return Err(FitScoutError::AlreadyRunning);
        }

        let checkpoint = self
            .ctx
            .storage
            .load_checkpoint(session_id)
            .await?
            .ok_or_else(|| FitScoutError::SessionNotFound(session_id.to_string()))?;

        let mut state = checkpoint.state;
        if state.is_range_exhausted() {
            return Err(FitScoutError::AlreadyCompleted(session_id.to_string()));
        }

        if let Some(loaded) = inner.catalog.as_ref() {
            if loaded.fingerprint() != checkpoint.catalog.fingerprint() {
                warn!(%session_id, "loaded catalog differs from the checkpoint's, using the checkpoint's");
            }
        }

        state.rebuild_leaderboard();
        state.error_message = None;
        state.set_status(SessionStatus::Running);
        info!(
            %session_id,
            processed = state.processed_count,
            next_index = state.next_index(),
            range_end = state.range_end,
            "resuming session"
        );

        inner.catalog = Some(checkpoint.catalog);
        inner.session = Some(state);
        self.spawn_worker(&mut inner, *session_id);
        Ok(())
    }

    /// Return a finished session to Idle.
    pub async fn reset(&self) -> Result<()> {
        let mut inner = self.ctx.inner.lock().await;
        if is_active(&inner) {
            return Err(FitScoutError::AlreadyRunning);
        }
        inner.session = None;
        Ok(())
    }

    pub async fn status(&self) -> StatusSnapshot {
        let inner = self.ctx.inner.lock().await;
        let total_automotive = inner
            .catalog
            .as_ref()
            .map_or(0, Catalog::total_automotive);
        let has_data = inner.catalog.is_some();

        match inner.session.as_ref() {
            Some(state) => StatusSnapshot {
                status: state.status,
                session_id: Some(state.session_id),
                range_start: state.range_start,
                range_end: state.range_end,
                processed_count: state.processed_count,
                successful_lookups: state.successful_lookups(),
                total_automotive,
                success_rate: state.success_rate(),
                progress_percentage: state.progress_percentage(),
                error_message: state.error_message.clone(),
                has_data,
            },
            None => StatusSnapshot {
                status: SessionStatus::Idle,
                session_id: None,
                range_start: 0,
                range_end: 0,
                processed_count: 0,
                successful_lookups: 0,
                total_automotive,
                success_rate: 0.0,
                progress_percentage: 0.0,
                error_message: None,
                has_data,
            },
        }
    }

    /// Result log of the current (or last) session.
    pub async fn results(&self) -> Vec<EnrichedResult> {
        let inner = self.ctx.inner.lock().await;
        inner
            .session
            .as_ref()
            .map(|s| s.result_log.clone())
            .unwrap_or_default()
    }

    pub async fn leaderboard(&self, n: usize) -> Vec<LeaderboardEntry> {
        let inner = self.ctx.inner.lock().await;
        inner
            .session
            .as_ref()
            .map(|s| s.leaderboard.top_n(n))
            .unwrap_or_default()
    }

    /// Every processed result plus passthrough rows for tools and unknown parts.
    pub async fn export(&self) -> Result<Vec<ExportRow>> {
        let inner = self.ctx.inner.lock().await;
        let catalog = inner.catalog.as_ref().ok_or(FitScoutError::NoDataLoaded)?;
        let results = inner
            .session
            .as_ref()
            .map(|s| s.result_log.as_slice())
            .unwrap_or_default();
        Ok(build_export(results, catalog))
    }

    /// Wait for the current worker, if any, to exit.
    pub async fn wait(&self) {
        let handle = self.ctx.inner.lock().await.worker.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "session worker panicked or was cancelled");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Checkpoints and history
    // -----------------------------------------------------------------------

    pub async fn checkpoints(&self) -> Result<Vec<CheckpointSummary>> {
        self.ctx.storage.list_checkpoints().await
    }

    /// Delete a stored checkpoint. The running session's checkpoint is protected.
    pub async fn delete_checkpoint(&self, session_id: &SessionId) -> Result<bool> {
        let inner = self.ctx.inner.lock().await;
        let is_current = inner
            .session
            .as_ref()
            .is_some_and(|s| s.session_id == *session_id && s.status.is_active());
        if is_current {
            return Err(FitScoutError::AlreadyRunning);
        }
        self.ctx.storage.delete_checkpoint(session_id).await
    }

    /// Most recent history summaries, newest first.
    pub async fn history(&self) -> Vec<HistorySummary> {
        self.ctx.inner.lock().await.history.list()
    }

    pub async fn history_record(&self, id: &HistoryId) -> Result<Option<HistoryRecord>> {
        self.ctx.storage.get_history(id).await
    }

    pub async fn delete_history(&self, id: &HistoryId) -> Result<bool> {
        let deleted = self.ctx.storage.delete_history(id).await?;
        let mut inner = self.ctx.inner.lock().await;
        let indexed = inner.history.remove(id);
        Ok(deleted || indexed)
    }

    fn spawn_worker(&self, inner: &mut Inner, session_id: SessionId) {
        self.ctx.stop_flag.store(false, Ordering::Release);
        let ctx = Arc::clone(&self.ctx);
        inner.worker = Some(tokio::spawn(worker::run_session(ctx, session_id)));
    }
}

fn is_active(inner: &Inner) -> bool {
    inner
        .session
        .as_ref()
        .is_some_and(|s| s.status.is_active())
}
