// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the bridge-daemon authors

use super::*;

#[test]
fn sandbox_gone_matches_known_substrings() {
    assert!(is_sandbox_gone("Error: No such container"));
    assert!(is_sandbox_gone("sandbox-42 is not running"));
    assert!(!is_sandbox_gone("permission denied"));
}

#[test]
fn cell_prefers_memory_over_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sandbox_id.txt");
    std::fs::write(&path, "on-disk-id").unwrap();

    let cell = SandboxCell::new(&path);
    assert_eq!(cell.get(), Some("on-disk-id".to_string()));

    cell.set("in-memory-id").unwrap();
    std::fs::write(&path, "stale-disk-value").unwrap();
    assert_eq!(cell.get(), Some("in-memory-id".to_string()));
}

#[test]
fn parse_sandbox_line_reads_tab_separated_id_and_workspace() {
    let info = parse_sandbox_line("sandbox-1\t/home/project").unwrap();
    assert_eq!(info.id, "sandbox-1");
    assert_eq!(info.workspace, PathBuf::from("/home/project"));
}

#[test]
fn parse_sandbox_line_rejects_a_malformed_line() {
    assert!(parse_sandbox_line("no-tab-here").is_none());
    assert!(parse_sandbox_line("\t/home/project").is_none());
}

#[test]
fn clear_empties_both_memory_and_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sandbox_id.txt");
    let cell = SandboxCell::new(&path);
    cell.set("id-1").unwrap();

    cell.clear();
    assert_eq!(cell.get(), None);
    assert!(!path.exists());
}
