// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the bridge-daemon authors

use super::*;

#[test]
fn sanitize_replaces_unsafe_characters() {
    assert_eq!(sanitize_schedule_name("morning plan!"), "morning_plan_");
    assert_eq!(sanitize_schedule_name("daily-report_v2"), "daily-report_v2");
}

#[test]
fn write_then_read_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path());

    assert_eq!(store.read(&SessionTarget::Main).unwrap(), None);
    store.write(&SessionTarget::Main, "s1").unwrap();
    assert_eq!(store.read(&SessionTarget::Main).unwrap(), Some("s1".to_string()));
}

#[test]
fn isolated_targets_use_independent_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path());
    let a = SessionTarget::Isolated("morning-plan".to_string());
    let b = SessionTarget::Isolated("evening-plan".to_string());

    store.write(&a, "sa").unwrap();
    store.write(&b, "sb").unwrap();

    assert_eq!(store.read(&a).unwrap(), Some("sa".to_string()));
    assert_eq!(store.read(&b).unwrap(), Some("sb".to_string()));
}

#[test]
fn clear_removes_the_file_and_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path());
    store.write(&SessionTarget::Main, "s1").unwrap();

    store.clear(&SessionTarget::Main).unwrap();
    assert_eq!(store.read(&SessionTarget::Main).unwrap(), None);

    // clearing an already-absent file is not an error
    store.clear(&SessionTarget::Main).unwrap();
}
