//! Core domain types for fitscout enrichment sessions.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{FitScoutError, Result};
use crate::leaderboard::{Leaderboard, LeaderboardEntry};

/// Current schema version for persisted checkpoints.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Serialized form of a lookup that produced no makes.
pub const NOT_FOUND: &str = "NOT_FOUND";

/// Source recorded for a lookup that produced no makes.
pub const SOURCE_NONE: &str = "NONE";

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a new time-sortable identifier.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

uuid_id!(
    /// A UUID v7 identifier for one enrichment run (time-sortable).
    SessionId
);

uuid_id!(
    /// A UUID v7 identifier for one archived history record.
    HistoryId
);

// ---------------------------------------------------------------------------
// Part records and catalog
// ---------------------------------------------------------------------------

/// One input row describing a catalog item. Never mutated after load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartRecord {
    /// Position in source order.
    pub index: usize,
    /// Opaque catalog id, e.g. `ACME_12345`.
    pub item_number: String,
    /// Derived from `item_number`: everything after the first `_`.
    pub part_number: String,
    pub description: String,
    pub quantity: u32,
    pub unit_price: f64,
    pub extended_price: f64,
}

impl PartRecord {
    /// Build a record, deriving the part number from the item number.
    pub fn new(
        index: usize,
        item_number: impl Into<String>,
        description: impl Into<String>,
        quantity: u32,
        unit_price: f64,
        extended_price: f64,
    ) -> Self {
        let item_number = item_number.into();
        Self {
            index,
            part_number: part_number_from_item(&item_number),
            item_number,
            description: description.into(),
            quantity,
            unit_price,
            extended_price,
        }
    }
}

/// Extract the lookup part number from a catalog item number.
///
/// `ACME_12-345` → `12-345`; item numbers without a separator are used verbatim.
pub fn part_number_from_item(item_number: &str) -> String {
    let trimmed = item_number.trim();
    match trimmed.split_once('_') {
        Some((_, rest)) => rest.trim().to_string(),
        None => trimmed.to_string(),
    }
}

/// A part as it appears in an input catalog file, before indexing.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPart {
    #[serde(default)]
    pub index: Option<usize>,
    pub item_number: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub quantity: u32,
    #[serde(default)]
    pub unit_price: f64,
    #[serde(default)]
    pub extended_price: f64,
}

/// On-disk catalog layout: parts already split into categories.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogInput {
    #[serde(default)]
    pub automotive: Vec<RawPart>,
    #[serde(default)]
    pub tools: Vec<RawPart>,
    #[serde(default)]
    pub unknown: Vec<RawPart>,
}

/// The loaded, categorized input. Session ranges index into `automotive`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub automotive: Vec<PartRecord>,
    #[serde(default)]
    pub tools: Vec<PartRecord>,
    #[serde(default)]
    pub unknown: Vec<PartRecord>,
}

impl Catalog {
    /// Parse a categorized catalog from JSON text.
    pub fn from_json(content: &str) -> Result<Self> {
        let input: CatalogInput = serde_json::from_str(content)
            .map_err(|e| FitScoutError::parse(format!("invalid catalog: {e}")))?;
        Ok(Self::from_input(input))
    }

    /// Index raw parts and derive their part numbers.
    pub fn from_input(input: CatalogInput) -> Self {
        fn build(parts: Vec<RawPart>) -> Vec<PartRecord> {
            parts
                .into_iter()
                .enumerate()
                .map(|(pos, raw)| {
                    PartRecord::new(
                        raw.index.unwrap_or(pos),
                        raw.item_number,
                        raw.description,
                        raw.quantity,
                        raw.unit_price,
                        raw.extended_price,
                    )
                })
                .collect()
        }

        Self {
            automotive: build(input.automotive),
            tools: build(input.tools),
            unknown: build(input.unknown),
        }
    }

    /// Number of automotive parts, the domain of every session range.
    pub fn total_automotive(&self) -> usize {
        self.automotive.len()
    }

    pub fn counts(&self) -> CategoryCounts {
        CategoryCounts {
            automotive: self.automotive.len(),
            tools: self.tools.len(),
            unknown: self.unknown.len(),
        }
    }

    /// SHA-256 over the canonical JSON form of the catalog.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        match serde_json::to_vec(self) {
            Ok(bytes) => hasher.update(&bytes),
            Err(e) => {
                tracing::warn!(error = %e, "catalog not serializable, fingerprinting counts only");
                hasher.update(format!("{:?}", self.counts()).as_bytes());
            }
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Per-category record counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCounts {
    pub automotive: usize,
    pub tools: usize,
    pub unknown: usize,
}

// ---------------------------------------------------------------------------
// Enrichment results
// ---------------------------------------------------------------------------

/// The makes attached to one processed record.
///
/// Serialized as the comma-and-space joined list, or `NOT_FOUND`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Makes {
    Found(Vec<String>),
    NotFound,
}

impl Makes {
    /// Wrap an extraction outcome; an empty set counts as not found.
    pub fn from_lookup(makes: Option<Vec<String>>) -> Self {
        match makes {
            Some(list) if !list.is_empty() => Self::Found(list),
            _ => Self::NotFound,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn as_slice(&self) -> &[String] {
        match self {
            Self::Found(list) => list,
            Self::NotFound => &[],
        }
    }
}

impl fmt::Display for Makes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Found(list) => f.write_str(&list.join(", ")),
            Self::NotFound => f.write_str(NOT_FOUND),
        }
    }
}

impl From<Makes> for String {
    fn from(makes: Makes) -> Self {
        makes.to_string()
    }
}

impl From<String> for Makes {
    fn from(s: String) -> Self {
        let list: Vec<String> = s
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty() && *m != NOT_FOUND)
            .map(String::from)
            .collect();
        if list.is_empty() {
            Self::NotFound
        } else {
            Self::Found(list)
        }
    }
}

/// Outcome of processing one automotive record. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedResult {
    /// Position in the automotive list.
    pub index: usize,
    pub part: PartRecord,
    pub makes: Makes,
    /// Where the match came from, or `NONE`.
    pub source: String,
}

impl EnrichedResult {
    pub fn new(index: usize, part: PartRecord, makes: Makes, source: &str) -> Self {
        let source = if makes.is_found() {
            source.to_string()
        } else {
            SOURCE_NONE.to_string()
        };
        Self {
            index,
            part,
            makes,
            source,
        }
    }

    pub fn is_successful(&self) -> bool {
        self.makes.is_found()
    }
}

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// Lifecycle of an enrichment session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Running,
    StopRequested,
    Stopped,
    Completed,
    Failed,
}

impl SessionStatus {
    /// A worker is alive for this session.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::StopRequested)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Completed | Self::Failed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::StopRequested => "stop_requested",
            Self::Stopped => "stopped",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Mutable state of one session. Invariant:
/// `range_start <= range_start + processed_count <= range_end`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub range_start: usize,
    pub range_end: usize,
    pub processed_count: usize,
    pub result_log: Vec<EnrichedResult>,
    /// Rebuilt from `result_log` on load; never trusted from disk.
    #[serde(skip)]
    pub leaderboard: Leaderboard,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub catalog_fingerprint: String,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    /// Fresh Running state for `[range_start, range_end)`.
    pub fn new(range_start: usize, range_end: usize, catalog_fingerprint: String) -> Self {
        let now = Utc::now();
        Self {
            session_id: SessionId::new(),
            status: SessionStatus::Running,
            range_start,
            range_end,
            processed_count: 0,
            result_log: Vec::new(),
            leaderboard: Leaderboard::default(),
            error_message: None,
            catalog_fingerprint,
            started_at: now,
            updated_at: now,
        }
    }

    pub fn range_len(&self) -> usize {
        self.range_end.saturating_sub(self.range_start)
    }

    /// Absolute index of the next record to process.
    pub fn next_index(&self) -> usize {
        self.range_start + self.processed_count
    }

    pub fn is_range_exhausted(&self) -> bool {
        self.processed_count >= self.range_len()
    }

    /// Record one processed result and fold it into the leaderboard.
    pub fn record(&mut self, result: EnrichedResult) {
        self.leaderboard
            .update(&result.makes.to_string(), result.part.quantity);
        self.result_log.push(result);
        self.processed_count += 1;
        self.updated_at = Utc::now();
    }

    pub fn successful_lookups(&self) -> usize {
        self.result_log.iter().filter(|r| r.is_successful()).count()
    }

    /// Successful lookups over processed records, as a fraction in `[0, 1]`.
    pub fn success_rate(&self) -> f64 {
        if self.processed_count == 0 {
            0.0
        } else {
            self.successful_lookups() as f64 / self.processed_count as f64
        }
    }

    /// Share of the range already processed, in percent (capped at 100).
    pub fn progress_percentage(&self) -> f64 {
        let len = self.range_len();
        if len == 0 {
            return 100.0;
        }
        (self.processed_count as f64 / len as f64 * 100.0).min(100.0)
    }

    /// Rebuild the leaderboard from the result log.
    pub fn rebuild_leaderboard(&mut self) {
        self.leaderboard = Leaderboard::from_results(&self.result_log);
    }

    pub fn set_status(&mut self, status: SessionStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

// ---------------------------------------------------------------------------
// Checkpoints
// ---------------------------------------------------------------------------

/// Durable snapshot sufficient to resume a session after a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub schema_version: u32,
    pub state: SessionState,
    pub catalog: Catalog,
    pub saved_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(state: SessionState, catalog: Catalog) -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            state,
            catalog,
            saved_at: Utc::now(),
        }
    }

    /// Parse a persisted checkpoint and rebuild its derived leaderboard.
    pub fn from_json(content: &str) -> Result<Self> {
        let mut checkpoint: Self = serde_json::from_str(content)?;
        if checkpoint.schema_version > CURRENT_SCHEMA_VERSION {
            return Err(FitScoutError::validation(format!(
                "checkpoint schema_version {} not supported",
                checkpoint.schema_version
            )));
        }
        checkpoint.state.rebuild_leaderboard();
        Ok(checkpoint)
    }

    pub fn summary(&self) -> CheckpointSummary {
        CheckpointSummary {
            session_id: self.state.session_id,
            saved_at: self.saved_at,
            status: self.state.status,
            range_start: self.state.range_start,
            range_end: self.state.range_end,
            processed_count: self.state.processed_count,
            progress_percentage: self.state.progress_percentage(),
        }
    }
}

/// Listing view of a stored checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointSummary {
    pub session_id: SessionId,
    pub saved_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub range_start: usize,
    pub range_end: usize,
    pub processed_count: usize,
    pub progress_percentage: f64,
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// How an archived session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryOutcome {
    Completed,
    Stopped,
}

impl fmt::Display for HistoryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::Stopped => f.write_str("stopped"),
        }
    }
}

/// Headline numbers of an archived session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryStats {
    pub total_processed: usize,
    pub successful_lookups: usize,
    /// Fraction in `[0, 1]`.
    pub success_rate: f64,
    pub range_start: usize,
    pub range_end: usize,
    pub total_automotive: usize,
    pub top_makes: Vec<LeaderboardEntry>,
}

/// Append-only archive of a completed or stopped session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: HistoryId,
    pub session_id: SessionId,
    pub outcome: HistoryOutcome,
    pub recorded_at: DateTime<Utc>,
    pub summary: HistoryStats,
    pub results: Vec<EnrichedResult>,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub catalog_counts: CategoryCounts,
}

/// Number of makes kept in a history summary.
pub const HISTORY_TOP_MAKES: usize = 3;

impl HistoryRecord {
    /// Archive the final state of a session.
    pub fn from_state(state: &SessionState, catalog: &Catalog, outcome: HistoryOutcome) -> Self {
        Self {
            id: HistoryId::new(),
            session_id: state.session_id,
            outcome,
            recorded_at: Utc::now(),
            summary: HistoryStats {
                total_processed: state.processed_count,
                successful_lookups: state.successful_lookups(),
                success_rate: state.success_rate(),
                range_start: state.range_start,
                range_end: state.range_end,
                total_automotive: catalog.total_automotive(),
                top_makes: state.leaderboard.top_n(HISTORY_TOP_MAKES),
            },
            results: state.result_log.clone(),
            leaderboard: state.leaderboard.entries().to_vec(),
            catalog_counts: catalog.counts(),
        }
    }

    pub fn summary(&self) -> HistorySummary {
        HistorySummary {
            id: self.id,
            session_id: self.session_id,
            outcome: self.outcome,
            recorded_at: self.recorded_at,
            summary: self.summary.clone(),
        }
    }
}

/// Listing view of a history record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySummary {
    pub id: HistoryId,
    pub session_id: SessionId,
    pub outcome: HistoryOutcome,
    pub recorded_at: DateTime<Utc>,
    pub summary: HistoryStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_catalog() -> Catalog {
        let content = std::fs::read_to_string("../../../fixtures/json/catalog.fixture.json")
            .expect("read catalog fixture");
        Catalog::from_json(&content).expect("parse catalog fixture")
    }

    #[test]
    fn part_number_derivation() {
        assert_eq!(part_number_from_item("ACME_12-345"), "12-345");
        assert_eq!(part_number_from_item("DORMAN_924_5208"), "924_5208");
        assert_eq!(part_number_from_item("PLAIN123"), "PLAIN123");
        assert_eq!(part_number_from_item(""), "");
    }

    #[test]
    fn catalog_fixture_parses() {
        let catalog = fixture_catalog();
        assert_eq!(catalog.counts().automotive, 4);
        assert_eq!(catalog.counts().tools, 1);
        assert_eq!(catalog.counts().unknown, 1);
        assert_eq!(catalog.automotive[0].part_number, "5208");
        assert_eq!(catalog.automotive[1].index, 1);
    }

    #[test]
    fn fingerprint_tracks_content() {
        let a = fixture_catalog();
        let mut b = a.clone();
        assert_eq!(a.fingerprint(), b.fingerprint());
        b.automotive.pop();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn makes_serialization() {
        let found = Makes::Found(vec!["Ford".into(), "Honda".into()]);
        assert_eq!(serde_json::to_string(&found).unwrap(), "\"Ford, Honda\"");
        assert_eq!(
            serde_json::to_string(&Makes::NotFound).unwrap(),
            "\"NOT_FOUND\""
        );

        let parsed: Makes = serde_json::from_str("\"Ford, Honda\"").unwrap();
        assert_eq!(parsed, found);
        let parsed: Makes = serde_json::from_str("\"NOT_FOUND\"").unwrap();
        assert_eq!(parsed, Makes::NotFound);
    }

    #[test]
    fn empty_lookup_is_not_found() {
        assert_eq!(Makes::from_lookup(Some(vec![])), Makes::NotFound);
        assert_eq!(Makes::from_lookup(None), Makes::NotFound);
        let part = PartRecord::new(0, "X_1", "thing", 1, 1.0, 1.0);
        let result = EnrichedResult::new(0, part, Makes::NotFound, "RockAuto");
        assert_eq!(result.source, SOURCE_NONE);
    }

    #[test]
    fn session_state_bookkeeping() {
        let mut state = SessionState::new(10, 14, "fp".into());
        assert_eq!(state.next_index(), 10);

        let part = PartRecord::new(10, "A_1", "brake pad", 4, 5.0, 20.0);
        state.record(EnrichedResult::new(
            10,
            part.clone(),
            Makes::Found(vec!["Ford".into()]),
            "RockAuto",
        ));
        state.record(EnrichedResult::new(11, part, Makes::NotFound, "RockAuto"));

        assert_eq!(state.processed_count, 2);
        assert_eq!(state.next_index(), 12);
        assert_eq!(state.successful_lookups(), 1);
        assert!((state.success_rate() - 0.5).abs() < f64::EPSILON);
        assert!((state.progress_percentage() - 50.0).abs() < f64::EPSILON);
        assert!(!state.is_range_exhausted());
        assert_eq!(state.leaderboard.top_n(1)[0].weighted_count, 4);
    }

    #[test]
    fn checkpoint_roundtrip_rebuilds_leaderboard() {
        let catalog = fixture_catalog();
        let mut state = SessionState::new(0, 2, catalog.fingerprint());
        state.record(EnrichedResult::new(
            0,
            catalog.automotive[0].clone(),
            Makes::Found(vec!["Honda".into()]),
            "RockAuto",
        ));

        let checkpoint = Checkpoint::new(state, catalog);
        let json = serde_json::to_string(&checkpoint).expect("serialize");
        let loaded = Checkpoint::from_json(&json).expect("deserialize");

        assert_eq!(loaded.state.result_log, checkpoint.state.result_log);
        assert_eq!(loaded.state.leaderboard, checkpoint.state.leaderboard);
    }

    #[test]
    fn future_checkpoint_schema_rejected() {
        let catalog = Catalog::default();
        let mut checkpoint = Checkpoint::new(SessionState::new(0, 0, String::new()), catalog);
        checkpoint.schema_version = 99;
        let json = serde_json::to_string(&checkpoint).unwrap();
        let err = Checkpoint::from_json(&json).unwrap_err();
        assert!(err.to_string().contains("schema_version 99"));
    }
}
