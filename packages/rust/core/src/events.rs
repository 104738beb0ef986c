//! Outward session events and the sink the worker pushes them into.

use serde::{Deserialize, Serialize};

use fitscout_shared::{
    EnrichedResult, LeaderboardEntry, PartRecord, Result, SessionId, SessionState,
};

/// The record currently being looked up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartPreview {
    pub index: usize,
    pub part_number: String,
    pub description: String,
}

impl From<&PartRecord> for PartPreview {
    fn from(part: &PartRecord) -> Self {
        Self {
            index: part.index,
            part_number: part.part_number.clone(),
            description: part.description.clone(),
        }
    }
}

/// Events pushed to observers during a session, tagged by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Emitted before each record is looked up.
    Progress {
        session_id: SessionId,
        current_index: usize,
        total_parts: usize,
        range_start: usize,
        range_end: usize,
        processed_count: usize,
        successful_lookups: usize,
        success_rate: f64,
        progress_percentage: f64,
        leaderboard: Vec<LeaderboardEntry>,
        current_part: PartPreview,
    },
    /// Emitted after each record is processed.
    Result {
        session_id: SessionId,
        result: EnrichedResult,
        leaderboard: Vec<LeaderboardEntry>,
    },
    Stopped {
        session_id: SessionId,
        message: String,
        partial_results: usize,
    },
    Completed {
        session_id: SessionId,
        message: String,
        total_results: usize,
        /// Fraction in `[0, 1]`.
        success_rate: f64,
    },
    Error {
        session_id: SessionId,
        message: String,
    },
}

impl SessionEvent {
    /// Progress snapshot for the record about to be processed.
    pub fn progress(
        state: &SessionState,
        part: &PartRecord,
        total_parts: usize,
        leaderboard_size: usize,
    ) -> Self {
        Self::Progress {
            session_id: state.session_id,
            current_index: state.next_index(),
            total_parts,
            range_start: state.range_start,
            range_end: state.range_end,
            processed_count: state.processed_count,
            successful_lookups: state.successful_lookups(),
            success_rate: state.success_rate(),
            progress_percentage: state.progress_percentage(),
            leaderboard: state.leaderboard.top_n(leaderboard_size),
            current_part: PartPreview::from(part),
        }
    }

    pub fn session_id(&self) -> SessionId {
        match self {
            Self::Progress { session_id, .. }
            | Self::Result { session_id, .. }
            | Self::Stopped { session_id, .. }
            | Self::Completed { session_id, .. }
            | Self::Error { session_id, .. } => *session_id,
        }
    }

    /// Stopped, Completed and Error end a session's event stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Stopped { .. } | Self::Completed { .. } | Self::Error { .. }
        )
    }

    /// Wire name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Progress { .. } => "progress",
            Self::Result { .. } => "result",
            Self::Stopped { .. } => "stopped",
            Self::Completed { .. } => "completed",
            Self::Error { .. } => "error",
        }
    }

    /// JSON text for text-based transports.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Receives events from the worker. Implementations must never block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: SessionEvent);
}

/// No-op sink for headless/test usage.
pub struct SilentSink;

impl EventSink for SilentSink {
    fn emit(&self, _event: SessionEvent) {}
}
