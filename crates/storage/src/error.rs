// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the bridge-daemon authors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("payload serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("unknown event type in row: {0}")]
    UnknownEventType(String),
    #[error("corrupt timestamp column {column}: {value}")]
    CorruptTimestamp { column: &'static str, value: String },
    #[error("event {0} not found")]
    NotFound(String),
}
