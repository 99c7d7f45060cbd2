// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the bridge-daemon authors

//! Daemon-crate environment variable access, kept separate from
//! `bridge_core::config::Env` (the secrets/allowlist required by the
//! engine itself) the way the teacher splits its own `env.rs` from the
//! lifecycle `Config`.

use std::path::PathBuf;

/// Base directory for all persisted state (`spec.md` §6). Defaults to the
/// literal path named there, relative to the working directory the daemon
/// is started from; `BRIDGE_STATE_DIR` overrides it for deployments that
/// need an absolute path.
pub fn state_dir() -> PathBuf {
    std::env::var("BRIDGE_STATE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("tmp/cc-bridge"))
}

/// Settings file path, alongside the state directory unless overridden.
pub fn settings_path() -> PathBuf {
    std::env::var("BRIDGE_SETTINGS_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| state_dir().join("settings.json"))
}
