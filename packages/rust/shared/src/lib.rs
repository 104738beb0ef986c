//! Shared types, error model, and configuration for fitscout.
//!
//! This crate is the foundation depended on by all other fitscout crates.
//! It provides:
//! - [`FitScoutError`], the unified error type
//! - Domain types ([`PartRecord`], [`Catalog`], [`EnrichedResult`], [`SessionState`],
//!   [`Checkpoint`], [`HistoryRecord`])
//! - The make [`Leaderboard`]
//! - Configuration ([`AppConfig`], [`LookupConfig`], [`SessionConfig`], config loading)

pub mod config;
pub mod error;
pub mod leaderboard;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, LookupConfig, LookupSection, SessionConfig, SessionSection, StorageSection,
    config_dir, config_file_path, init_config, load_config, load_config_from,
};
pub use error::{FitScoutError, Result};
pub use leaderboard::{Leaderboard, LeaderboardEntry};
pub use types::{
    CURRENT_SCHEMA_VERSION, Catalog, CatalogInput, CategoryCounts, Checkpoint, CheckpointSummary,
    EnrichedResult, HISTORY_TOP_MAKES, HistoryId, HistoryOutcome, HistoryRecord, HistoryStats,
    HistorySummary, Makes, NOT_FOUND, PartRecord, RawPart, SOURCE_NONE, SessionId, SessionState,
    SessionStatus, part_number_from_item,
};
