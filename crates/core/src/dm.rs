// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the bridge-daemon authors

//! DM lifecycle state (`spec.md` §3 "DM state" / "DM offset").

use chrono::{DateTime, Utc};

/// One row per DM message ever seen.
#[derive(Debug, Clone)]
pub struct DmState {
    pub message_id: String,
    pub channel_id: String,
    pub author_id: String,
    pub eye_applied: bool,
    pub processing_done: bool,
    pub check_applied: bool,
    pub terminal_failed: bool,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DmState {
    /// A DM row that has nothing left to do: either it completed cleanly or
    /// it failed terminally. `spec.md` §3 lifecycle: "inert when
    /// terminal_failed or check_applied is true".
    pub fn is_inert(&self) -> bool {
        self.terminal_failed || self.check_applied
    }
}

/// Builds the offset scope key for a user's DM stream (`spec.md` §3: "One row
/// per `dm_user:<userId>` scope").
pub fn offset_scope(user_id: &str) -> String {
    format!("dm_user:{user_id}")
}

/// Dedupe key for a `dm.incoming` publish, shared by the live gateway
/// callback and reconcile/recovery's republish paths so the same message
/// can never be queued twice under two different keys.
pub fn dm_incoming_dedupe_key(message_id: &str) -> String {
    format!("dm.incoming:{message_id}")
}

/// Compare two platform message ids numerically, falling back to string
/// comparison if either fails to parse as `u64` (`spec.md` §3/§4.1: "platform
/// message ids are monotonic snowflake integers; compare as integers with
/// string fallback").
pub fn message_id_greater(candidate: &str, existing: &str) -> bool {
    match (candidate.parse::<u128>(), existing.parse::<u128>()) {
        (Ok(c), Ok(e)) => c > e,
        _ => candidate > existing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_scope_formats_as_spec_requires() {
        assert_eq!(offset_scope("111"), "dm_user:111");
    }

    #[test]
    fn numeric_ids_compare_as_integers() {
        // "9" < "10" lexicographically but not numerically; the numeric
        // comparison must win.
        assert!(message_id_greater("10", "9"));
        assert!(!message_id_greater("9", "10"));
    }

    #[test]
    fn non_numeric_ids_fall_back_to_string_compare() {
        assert!(message_id_greater("b", "a"));
    }
}
