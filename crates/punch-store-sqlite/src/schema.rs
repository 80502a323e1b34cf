//! SQL schema for the punch SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS subjects (
    subject_id  TEXT PRIMARY KEY,
    code        TEXT NOT NULL UNIQUE,
    name        TEXT NOT NULL,
    active      INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL
);

-- A tag belongs to exactly one subject.
CREATE TABLE IF NOT EXISTS tag_bindings (
    tag         TEXT PRIMARY KEY,
    subject_id  TEXT NOT NULL REFERENCES subjects(subject_id) ON DELETE CASCADE,
    label       TEXT,
    active      INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL
);

-- One row per subject per local calendar day.
CREATE TABLE IF NOT EXISTS attendances (
    subject_id    TEXT NOT NULL REFERENCES subjects(subject_id),
    date          TEXT NOT NULL,   -- YYYY-MM-DD
    check_in_at   TEXT,            -- local time, set once
    check_out_at  TEXT,            -- local time, last checkout wins
    PRIMARY KEY (subject_id, date)
);

-- Scan log entries are strictly append-only.
-- Only an administrative purge ever issues DELETE against this table.
CREATE TABLE IF NOT EXISTS scan_log (
    seq          INTEGER PRIMARY KEY AUTOINCREMENT,
    entry_id     TEXT NOT NULL UNIQUE,
    tag          TEXT NOT NULL,
    subject_id   TEXT REFERENCES subjects(subject_id),
    observed_at  TEXT NOT NULL,
    reader_id    TEXT NOT NULL,
    outcome      TEXT NOT NULL,
    note         TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS system_config (
    config_key    TEXT PRIMARY KEY,
    config_value  TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS tag_bindings_subject_idx ON tag_bindings(subject_id);
CREATE INDEX IF NOT EXISTS attendances_date_idx     ON attendances(date);
CREATE INDEX IF NOT EXISTS scan_log_tag_idx         ON scan_log(tag, observed_at);
CREATE INDEX IF NOT EXISTS scan_log_observed_idx    ON scan_log(observed_at);

PRAGMA user_version = 1;
";
