// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the bridge-daemon authors

//! Schema DDL (`spec.md` §6 "Persisted state": three tables, with the
//! indices named there).

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    id TEXT PRIMARY KEY,
    event_type TEXT NOT NULL,
    payload_json TEXT NOT NULL,
    lane TEXT NOT NULL,
    lane_rank INTEGER NOT NULL,
    priority INTEGER NOT NULL,
    dedupe_key TEXT,
    attempt_count INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    available_at TEXT NOT NULL,
    locked_by TEXT,
    locked_at TEXT,
    last_error TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS events_dedupe_key_idx
    ON events(dedupe_key) WHERE dedupe_key IS NOT NULL;

CREATE INDEX IF NOT EXISTS events_claim_idx
    ON events(status, available_at, created_at);

CREATE TABLE IF NOT EXISTS dm_messages (
    message_id TEXT PRIMARY KEY,
    channel_id TEXT NOT NULL,
    author_id TEXT NOT NULL,
    eye_applied INTEGER NOT NULL DEFAULT 0,
    processing_done INTEGER NOT NULL DEFAULT 0,
    check_applied INTEGER NOT NULL DEFAULT 0,
    terminal_failed INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS dm_messages_eye_idx
    ON dm_messages(eye_applied, terminal_failed, updated_at);

CREATE INDEX IF NOT EXISTS dm_messages_check_idx
    ON dm_messages(processing_done, check_applied, terminal_failed, updated_at);

CREATE TABLE IF NOT EXISTS dm_offsets (
    scope TEXT PRIMARY KEY,
    message_id TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;
