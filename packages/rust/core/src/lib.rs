//! Session orchestration for fitscout.
//!
//! This crate ties the extractor, storage and broadcaster together into a
//! resumable enrichment pipeline:
//! - [`SessionManager`] owns the session state machine and spawns the worker
//! - [`Broadcaster`] fans [`SessionEvent`]s out to observers
//! - [`export`] and [`history`] shape finished sessions for output

pub mod broadcaster;
pub mod events;
pub mod export;
pub mod history;
pub mod session;
mod worker;

pub use broadcaster::{Broadcaster, Observer};
pub use events::{EventSink, PartPreview, SessionEvent, SilentSink};
pub use export::{ExportRow, PartCategory, build_export};
pub use history::HistoryIndex;
pub use session::{SessionManager, StatusSnapshot};
