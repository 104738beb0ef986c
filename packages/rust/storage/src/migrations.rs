//! SQL migration definitions for the fitscout database.
//!
//! Migrations are applied in order on database open.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: checkpoints, history",
            sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per session, overwritten on every checkpoint write
CREATE TABLE IF NOT EXISTS checkpoints (
    session_id      TEXT PRIMARY KEY,
    saved_at        TEXT NOT NULL,
    status          TEXT NOT NULL,
    range_start     INTEGER NOT NULL,
    range_end       INTEGER NOT NULL,
    processed_count INTEGER NOT NULL,
    state_json      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_checkpoints_saved_at ON checkpoints(saved_at);

-- Append-only archive of stopped and completed sessions
CREATE TABLE IF NOT EXISTS history (
    id           TEXT PRIMARY KEY,
    session_id   TEXT NOT NULL,
    outcome      TEXT NOT NULL,
    recorded_at  TEXT NOT NULL,
    summary_json TEXT NOT NULL,
    record_json  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_history_recorded_at ON history(recorded_at);
CREATE INDEX IF NOT EXISTS idx_history_session ON history(session_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Catalog fingerprint on checkpoints",
            sql: r#"
ALTER TABLE checkpoints ADD COLUMN catalog_fingerprint TEXT NOT NULL DEFAULT '';

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
