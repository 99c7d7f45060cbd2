// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the bridge-daemon authors

//! The three-subcommand surface (`spec.md` §6 "CLI surface"). `send` and
//! `schedule` act directly on the same SQLite file the running daemon
//! uses — SQLite's multi-process access makes that safe without an IPC
//! layer, unlike the teacher's `oj` CLI talking to `ojd` over a socket.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bridged", version, about = "Personal-agent bridge daemon")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the full pipeline (default).
    Daemon,
    /// Enqueue a one-off outbound message.
    Send {
        user_id: String,
        #[arg(short, long = "file")]
        file: Vec<PathBuf>,
        message: Option<String>,
        /// Print the enqueued event as JSON instead of a human summary.
        #[arg(long)]
        json: bool,
    },
    /// Run a named schedule once and print its output.
    Schedule {
        name: String,
        /// Print the result as JSON instead of plain text.
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    pub fn command(self) -> Command {
        self.command.unwrap_or(Command::Daemon)
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
