// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the bridge-daemon authors

//! The durable event store (`spec.md` §4.1).

use crate::error::StoreError;
use crate::schema::SCHEMA;
use bridge_core::{DmState, Event, EventId, EventInput, EventStatus, EventType, Lane};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

/// SQLite busy-timeout applied to every connection (`spec.md` §4.1
/// "Durability": "a busy-timeout of a few seconds prevents transient
/// contention with schema-migrating readers").
const BUSY_TIMEOUT_MS: u64 = 5000;

pub struct EventStore {
    conn: Mutex<Connection>,
}

impl EventStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ---------------------------------------------------------------
    // Events
    // ---------------------------------------------------------------

    /// `spec.md` §4.1 "publish": inserts pending, or returns the existing id
    /// on dedupe-key collision (`spec.md` §8, property 1).
    pub fn publish(&self, input: EventInput) -> Result<EventId, StoreError> {
        let conn = self.conn.lock();
        if let Some(key) = &input.dedupe_key {
            let existing: Option<String> = conn
                .query_row(
                    "SELECT id FROM events WHERE dedupe_key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(id) = existing {
                return Ok(EventId::new(id));
            }
        }

        let id = EventId::generate();
        let now = Utc::now();
        let available_at = input.available_at.unwrap_or(now);
        let payload_json = serde_json::to_string(&input.event_type)?;

        conn.execute(
            "INSERT INTO events (id, event_type, payload_json, lane, lane_rank, priority, \
             dedupe_key, attempt_count, status, available_at, locked_by, locked_at, \
             last_error, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?9, NULL, NULL, NULL, ?10, ?10)",
            params![
                id.as_str(),
                input.event_type.type_name(),
                payload_json,
                input.lane.as_str(),
                input.lane.rank(),
                input.priority,
                input.dedupe_key,
                EventStatus::Pending.as_str(),
                fmt_ts(available_at),
                fmt_ts(now),
            ],
        )?;

        Ok(id)
    }

    /// `spec.md` §4.1 "claim_next": atomically claims the highest-priority
    /// claimable row (`spec.md` §8, properties 2-3).
    pub fn claim_next(&self, worker_id: &str) -> Result<Option<Event>, StoreError> {
        let conn = self.conn.lock();
        let now = Utc::now();
        let row = conn
            .query_row(
                "UPDATE events SET status = ?1, locked_by = ?2, locked_at = ?3, updated_at = ?3 \
                 WHERE id = ( \
                     SELECT id FROM events \
                     WHERE status IN (?4, ?5) AND available_at <= ?3 \
                     ORDER BY lane_rank ASC, priority DESC, created_at ASC \
                     LIMIT 1 \
                 ) \
                 RETURNING id, event_type, payload_json, lane, priority, dedupe_key, \
                           attempt_count, status, available_at, locked_by, locked_at, \
                           last_error, created_at, updated_at",
                params![
                    EventStatus::Processing.as_str(),
                    worker_id,
                    fmt_ts(now),
                    EventStatus::Pending.as_str(),
                    EventStatus::Retry.as_str(),
                ],
                row_to_event,
            )
            .optional()?;
        row.transpose()
    }

    pub fn mark_done(&self, id: &EventId) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE events SET status = ?1, locked_by = NULL, locked_at = NULL, updated_at = ?2 \
             WHERE id = ?3",
            params![EventStatus::Done.as_str(), fmt_ts(Utc::now()), id.as_str()],
        )?;
        Ok(())
    }

    pub fn mark_retry(&self, id: &EventId, error: &str, delay_ms: u64) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let now = Utc::now();
        let available_at = now + chrono::Duration::milliseconds(delay_ms as i64);
        conn.execute(
            "UPDATE events SET status = ?1, attempt_count = attempt_count + 1, \
             available_at = ?2, locked_by = NULL, locked_at = NULL, last_error = ?3, \
             updated_at = ?4 WHERE id = ?5",
            params![
                EventStatus::Retry.as_str(),
                fmt_ts(available_at),
                error,
                fmt_ts(now),
                id.as_str(),
            ],
        )?;
        Ok(())
    }

    pub fn mark_dead(&self, id: &EventId, error: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE events SET status = ?1, attempt_count = attempt_count + 1, \
             locked_by = NULL, locked_at = NULL, last_error = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                EventStatus::Dead.as_str(),
                error,
                fmt_ts(Utc::now()),
                id.as_str(),
            ],
        )?;
        Ok(())
    }

    /// Refresh `locked_at` on a row this worker still holds, so a
    /// long-running agent-CLI call does not race `requeue_stale_processing`
    /// (`SPEC_FULL.md` §2 "(SUPPLEMENT)"; `spec.md` §9 open question 1).
    pub fn touch_lock(&self, id: &EventId, worker_id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE events SET locked_at = ?1 WHERE id = ?2 AND locked_by = ?3 AND status = ?4",
            params![
                fmt_ts(Utc::now()),
                id.as_str(),
                worker_id,
                EventStatus::Processing.as_str(),
            ],
        )?;
        Ok(())
    }

    /// `spec.md` §4.1 "requeue_stale_processing": resets rows whose lock is
    /// older than `lock_timeout_ms` back to `retry`.
    pub fn requeue_stale_processing(&self, lock_timeout_ms: i64) -> Result<u64, StoreError> {
        let conn = self.conn.lock();
        let now = Utc::now();
        let threshold = now - chrono::Duration::milliseconds(lock_timeout_ms);
        let affected = conn.execute(
            "UPDATE events SET status = ?1, locked_by = NULL, locked_at = NULL, updated_at = ?2 \
             WHERE status = ?3 AND locked_at IS NOT NULL AND locked_at < ?4",
            params![
                EventStatus::Retry.as_str(),
                fmt_ts(now),
                EventStatus::Processing.as_str(),
                fmt_ts(threshold),
            ],
        )?;
        Ok(affected as u64)
    }

    /// `spec.md` §4.1 "has_active_dm_incoming_event".
    pub fn has_active_dm_incoming_event(&self, message_id: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM events \
             WHERE event_type = 'dm.incoming' \
               AND status IN (?1, ?2, ?3) \
               AND json_extract(payload_json, '$.payload.message_id') = ?4",
            params![
                EventStatus::Pending.as_str(),
                EventStatus::Processing.as_str(),
                EventStatus::Retry.as_str(),
                message_id,
            ],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // ---------------------------------------------------------------
    // DM state
    // ---------------------------------------------------------------

    pub fn upsert_dm(
        &self,
        message_id: &str,
        channel_id: &str,
        author_id: &str,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let now = fmt_ts(Utc::now());
        conn.execute(
            "INSERT INTO dm_messages (message_id, channel_id, author_id, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?4) \
             ON CONFLICT(message_id) DO NOTHING",
            params![message_id, channel_id, author_id, now],
        )?;
        Ok(())
    }

    pub fn get_dm_state(&self, message_id: &str) -> Result<Option<DmState>, StoreError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT message_id, channel_id, author_id, eye_applied, processing_done, \
             check_applied, terminal_failed, last_error, created_at, updated_at \
             FROM dm_messages WHERE message_id = ?1",
            params![message_id],
            row_to_dm_state,
        )
        .optional()?
        .transpose()
    }

    pub fn mark_eye_applied(&self, message_id: &str) -> Result<(), StoreError> {
        self.set_dm_flag(message_id, "eye_applied")
    }

    pub fn mark_processing_done(&self, message_id: &str) -> Result<(), StoreError> {
        self.set_dm_flag(message_id, "processing_done")
    }

    pub fn mark_check_applied(&self, message_id: &str) -> Result<(), StoreError> {
        self.set_dm_flag(message_id, "check_applied")
    }

    fn set_dm_flag(&self, message_id: &str, column: &'static str) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let sql = format!(
            "UPDATE dm_messages SET {column} = 1, updated_at = ?1 WHERE message_id = ?2"
        );
        conn.execute(&sql, params![fmt_ts(Utc::now()), message_id])?;
        Ok(())
    }

    pub fn mark_dm_terminal_failure(&self, message_id: &str, error: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE dm_messages SET terminal_failed = 1, last_error = ?1, updated_at = ?2 \
             WHERE message_id = ?3",
            params![error, fmt_ts(Utc::now()), message_id],
        )?;
        Ok(())
    }

    pub fn set_dm_last_error(&self, message_id: &str, error: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE dm_messages SET last_error = ?1, updated_at = ?2 WHERE message_id = ?3",
            params![error, fmt_ts(Utc::now()), message_id],
        )?;
        Ok(())
    }

    pub fn list_dm_missing_eye(&self, limit: u32) -> Result<Vec<DmState>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT message_id, channel_id, author_id, eye_applied, processing_done, \
             check_applied, terminal_failed, last_error, created_at, updated_at \
             FROM dm_messages WHERE eye_applied = 0 AND terminal_failed = 0 \
             ORDER BY updated_at ASC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], row_to_dm_state)?;
        rows.collect::<Result<Vec<_>, _>>()?.into_iter().collect()
    }

    pub fn list_dm_missing_check(&self, limit: u32) -> Result<Vec<DmState>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT message_id, channel_id, author_id, eye_applied, processing_done, \
             check_applied, terminal_failed, last_error, created_at, updated_at \
             FROM dm_messages WHERE processing_done = 1 AND check_applied = 0 \
             AND terminal_failed = 0 ORDER BY updated_at ASC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], row_to_dm_state)?;
        rows.collect::<Result<Vec<_>, _>>()?.into_iter().collect()
    }

    /// `SPEC_FULL.md` §2 "(SUPPLEMENT)": retention sweep for inert DM rows.
    pub fn prune_dm_state(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError> {
        let conn = self.conn.lock();
        let affected = conn.execute(
            "DELETE FROM dm_messages WHERE updated_at < ?1 AND (check_applied = 1 OR terminal_failed = 1)",
            params![fmt_ts(older_than)],
        )?;
        Ok(affected as u64)
    }

    // ---------------------------------------------------------------
    // DM offsets
    // ---------------------------------------------------------------

    pub fn get_offset(&self, scope: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT message_id FROM dm_offsets WHERE scope = ?1",
            params![scope],
            |row| row.get(0),
        )
        .optional()
        .map_err(StoreError::from)
    }

    /// Writes only if `message_id` is greater than the current offset
    /// (`spec.md` §4.1/§8 property 5). Returns whether the offset advanced.
    pub fn update_offset(&self, scope: &str, message_id: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let current: Option<String> = conn
            .query_row(
                "SELECT message_id FROM dm_offsets WHERE scope = ?1",
                params![scope],
                |row| row.get(0),
            )
            .optional()?;

        let should_write = match &current {
            None => true,
            Some(existing) => bridge_core::dm::message_id_greater(message_id, existing),
        };

        if should_write {
            conn.execute(
                "INSERT INTO dm_offsets (scope, message_id, updated_at) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(scope) DO UPDATE SET message_id = ?2, updated_at = ?3",
                params![scope, message_id, fmt_ts(Utc::now())],
            )?;
        }

        Ok(should_write)
    }
}

fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

fn parse_ts(column: &'static str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::CorruptTimestamp {
            column,
            value: value.to_string(),
        })
}

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<Result<Event, StoreError>> {
    Ok((|| -> Result<Event, StoreError> {
        let payload_json: String = row.get("payload_json")?;
        let event_type: EventType = serde_json::from_str(&payload_json)?;
        let lane_str: String = row.get("lane")?;
        let lane = Lane::parse(&lane_str).unwrap_or(Lane::System);
        let status_str: String = row.get("status")?;
        let status = EventStatus::parse(&status_str).unwrap_or(EventStatus::Pending);

        Ok(Event {
            id: EventId::new(row.get::<_, String>("id")?),
            event_type,
            lane,
            priority: row.get("priority")?,
            dedupe_key: row.get("dedupe_key")?,
            attempt_count: row.get::<_, i64>("attempt_count")? as u32,
            status,
            available_at: parse_ts("available_at", &row.get::<_, String>("available_at")?)?,
            locked_by: row.get("locked_by")?,
            locked_at: row
                .get::<_, Option<String>>("locked_at")?
                .map(|s| parse_ts("locked_at", &s))
                .transpose()?,
            last_error: row.get("last_error")?,
            created_at: parse_ts("created_at", &row.get::<_, String>("created_at")?)?,
            updated_at: parse_ts("updated_at", &row.get::<_, String>("updated_at")?)?,
        })
    })())
}

fn row_to_dm_state(row: &Row<'_>) -> rusqlite::Result<Result<DmState, StoreError>> {
    Ok((|| -> Result<DmState, StoreError> {
        Ok(DmState {
            message_id: row.get("message_id")?,
            channel_id: row.get("channel_id")?,
            author_id: row.get("author_id")?,
            eye_applied: row.get::<_, i64>("eye_applied")? != 0,
            processing_done: row.get::<_, i64>("processing_done")? != 0,
            check_applied: row.get::<_, i64>("check_applied")? != 0,
            terminal_failed: row.get::<_, i64>("terminal_failed")? != 0,
            last_error: row.get("last_error")?,
            created_at: parse_ts("created_at", &row.get::<_, String>("created_at")?)?,
            updated_at: parse_ts("updated_at", &row.get::<_, String>("updated_at")?)?,
        })
    })())
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
