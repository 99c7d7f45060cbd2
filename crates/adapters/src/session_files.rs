// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the bridge-daemon authors

//! Persistent agent-CLI session identifiers (`spec.md` §3 "Session file").

use std::io;
use std::path::{Path, PathBuf};

/// Which session file a call should read/write.
///
/// `spec.md` §9 "Session files as naming-sensitive state": the isolated
/// filename is derived by replacing any character outside `[A-Za-z0-9_-]`
/// with `_`, via [`sanitize_schedule_name`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionTarget {
    Main,
    Isolated(String),
}

pub fn sanitize_schedule_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '-' => c,
            _ => '_',
        })
        .collect()
}

/// Reads/writes/clears the text files holding the agent CLI's opaque
/// session id (`spec.md` §3 "Session file": "main" is a single file,
/// "isolated per-schedule" is one file per sanitized schedule name).
#[derive(Debug, Clone)]
pub struct SessionStore {
    base_dir: PathBuf,
}

impl SessionStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn path_for(&self, target: &SessionTarget) -> PathBuf {
        match target {
            SessionTarget::Main => self.base_dir.join("session_id.txt"),
            SessionTarget::Isolated(name) => self
                .base_dir
                .join("sessions")
                .join(format!("{}.txt", sanitize_schedule_name(name))),
        }
    }

    pub fn read(&self, target: &SessionTarget) -> io::Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(target)) {
            Ok(contents) => {
                let trimmed = contents.trim();
                Ok(if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn write(&self, target: &SessionTarget, session_id: &str) -> io::Result<()> {
        let path = self.path_for(target);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, session_id)
    }

    /// `spec.md` §4.5 "`!reset` clears the session file".
    pub fn clear(&self, target: &SessionTarget) -> io::Result<()> {
        match std::fs::remove_file(self.path_for(target)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

#[cfg(test)]
#[path = "session_files_tests.rs"]
mod tests;
