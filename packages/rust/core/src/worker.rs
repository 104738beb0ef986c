//! The background task that processes one session's range.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tracing::{debug, error, info, instrument, warn};

use fitscout_extractor::{FetcherFactory, PageFetcher};
use fitscout_shared::{
    Checkpoint, EnrichedResult, HistoryOutcome, HistoryRecord, Makes, SessionId, SessionState,
    SessionStatus,
};

use crate::events::SessionEvent;
use crate::session::SessionContext;

/// Why the record loop ended.
enum Exit {
    Completed,
    Stopped,
    Failed(String),
}

/// Open a fetcher, process the remaining range, then persist and announce the outcome.
#[instrument(skip_all, fields(session_id = %session_id))]
pub(crate) async fn run_session<F: FetcherFactory>(
    ctx: Arc<SessionContext<F>>,
    session_id: SessionId,
) {
    let exit = match ctx.factory.open().await {
        Ok(fetcher) => {
            let exit = process(&ctx, &fetcher).await;
            fetcher.release();
            exit
        }
        Err(e) => {
            error!(error = %e, "could not open page fetcher");
            Exit::Failed(e.to_string())
        }
    };
    finish(&ctx, session_id, exit).await;
}

async fn process<F: FetcherFactory>(ctx: &SessionContext<F>, fetcher: &F::Fetcher) -> Exit {
    let interval = ctx.config.checkpoint_interval.max(1);

    loop {
        // --- Snapshot the next record ---
        let (index, part, progress) = {
            let inner = ctx.inner.lock().await;
            let (Some(state), Some(catalog)) = (inner.session.as_ref(), inner.catalog.as_ref())
            else {
                return Exit::Failed("session state missing".into());
            };
            if state.is_range_exhausted() {
                return Exit::Completed;
            }
            if ctx.stop_flag.load(Ordering::Acquire) {
                return Exit::Stopped;
            }

            let index = state.next_index();
            let Some(part) = catalog.automotive.get(index).cloned() else {
                return Exit::Failed(format!("record {index} is missing from the catalog"));
            };
            let progress = SessionEvent::progress(
                state,
                &part,
                catalog.total_automotive(),
                ctx.config.leaderboard_size,
            );
            (index, part, progress)
        };

        if let Err(e) = fetcher.ensure_ready() {
            error!(index, error = %e, "page fetcher unusable");
            return Exit::Failed(e.to_string());
        }

        ctx.sink.emit(progress);

        // --- Lookup (no lock held) ---
        let outcome = ctx
            .extractor
            .lookup(fetcher, &part.part_number, &part.description)
            .await;
        debug!(index, part_number = %part.part_number, outcome = outcome.label(), "lookup finished");

        let result = EnrichedResult::new(
            index,
            part,
            Makes::from_lookup(outcome.into_makes()),
            fetcher.source_name(),
        );

        // --- Record ---
        let (event, checkpoint) = {
            let mut guard = ctx.inner.lock().await;
            let inner = &mut *guard;
            let (Some(state), Some(catalog)) = (inner.session.as_mut(), inner.catalog.as_ref())
            else {
                return Exit::Failed("session state missing".into());
            };

            state.record(result.clone());
            let event = SessionEvent::Result {
                session_id: state.session_id,
                result,
                leaderboard: state.leaderboard.top_n(ctx.config.leaderboard_size),
            };
            let checkpoint = (state.processed_count % interval == 0)
                .then(|| Checkpoint::new(state.clone(), catalog.clone()));
            (event, checkpoint)
        };

        ctx.sink.emit(event);

        if let Some(checkpoint) = checkpoint {
            save_checkpoint(ctx, &checkpoint).await;
        }

        tokio::task::yield_now().await;
    }
}

/// Persist the terminal checkpoint and history, then publish the final state.
async fn finish<F: FetcherFactory>(ctx: &SessionContext<F>, session_id: SessionId, exit: Exit) {
    let (status, error_message) = match &exit {
        Exit::Completed => (SessionStatus::Completed, None),
        Exit::Stopped => (SessionStatus::Stopped, None),
        Exit::Failed(msg) => (SessionStatus::Failed, Some(msg.clone())),
    };

    let snapshot = {
        let inner = ctx.inner.lock().await;
        inner.session.as_ref().map(|state| {
            let mut state: SessionState = state.clone();
            state.set_status(status);
            state.error_message = error_message.clone();
            (state, inner.catalog.clone().unwrap_or_default())
        })
    };
    let Some((final_state, catalog)) = snapshot else {
        warn!("session vanished before the worker finished");
        return;
    };

    save_checkpoint(ctx, &Checkpoint::new(final_state.clone(), catalog.clone())).await;

    let outcome = match exit {
        Exit::Completed => Some(HistoryOutcome::Completed),
        Exit::Stopped => Some(HistoryOutcome::Stopped),
        Exit::Failed(_) => None,
    };
    let history = match outcome {
        Some(outcome) => {
            let record = HistoryRecord::from_state(&final_state, &catalog, outcome);
            match ctx.storage.append_history(&record).await {
                Ok(()) => Some(record.summary()),
                Err(e) => {
                    warn!(error = %e, "failed to archive session history");
                    None
                }
            }
        }
        None => None,
    };

    {
        let mut inner = ctx.inner.lock().await;
        if let Some(state) = inner.session.as_mut() {
            state.set_status(status);
            state.error_message = error_message.clone();
        }
        if let Some(summary) = history {
            inner.history.push(summary);
        }
    }

    let processed = final_state.processed_count;
    let event = match status {
        SessionStatus::Completed => {
            info!(processed, success_rate = final_state.success_rate(), "session completed");
            SessionEvent::Completed {
                session_id,
                message: format!("Processing completed: {processed} parts"),
                total_results: processed,
                success_rate: final_state.success_rate(),
            }
        }
        SessionStatus::Stopped => {
            info!(processed, "session stopped");
            SessionEvent::Stopped {
                session_id,
                message: "Processing stopped by user".into(),
                partial_results: processed,
            }
        }
        _ => {
            let message = error_message.unwrap_or_else(|| "unknown error".into());
            error!(processed, %message, "session failed");
            SessionEvent::Error {
                session_id,
                message,
            }
        }
    };
    ctx.sink.emit(event);
}

async fn save_checkpoint<F: FetcherFactory>(ctx: &SessionContext<F>, checkpoint: &Checkpoint) {
    if let Err(e) = ctx.storage.save_checkpoint(checkpoint).await {
        warn!(
            processed = checkpoint.state.processed_count,
            error = %e,
            "checkpoint write failed, continuing"
        );
    }
}
