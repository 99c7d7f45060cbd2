// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the bridge-daemon authors

//! Configuration surface (`spec.md` §6 "Configuration").
//!
//! Two layers: required environment variables (the bot token and the
//! allowlist) and an optional on-disk JSON settings file. We validate field
//! ranges ourselves with `serde` + `deny_unknown_fields` rather than a
//! general JSON-schema validator, which `spec.md` §1 explicitly leaves to an
//! external collaborator.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnv(&'static str),
    #[error("invalid allowed user id {0:?}: must be an 18-20 digit snowflake")]
    InvalidUserId(String),
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{field} must be in [{min}, {max}], got {value}")]
    OutOfRange {
        field: &'static str,
        min: i64,
        max: i64,
        value: i64,
    },
    #[error("env key {0:?} is not a valid identifier")]
    InvalidEnvKey(String),
    #[error("env key {0:?} is reserved and may not be overridden")]
    ReservedEnvKey(String),
}

/// Required environment: the bot token plus the DM allowlist.
#[derive(Debug, Clone)]
pub struct Env {
    pub bot_token: String,
    pub allowed_user_ids: Vec<String>,
}

fn is_snowflake(s: &str) -> bool {
    (17..=20).contains(&s.len()) && s.chars().all(|c| c.is_ascii_digit())
}

impl Env {
    /// Read `BOT_TOKEN` and `ALLOWED_USER_IDS` from the process environment.
    pub fn from_environ() -> Result<Self, ConfigError> {
        let bot_token =
            std::env::var("BOT_TOKEN").map_err(|_| ConfigError::MissingEnv("BOT_TOKEN"))?;
        let raw = std::env::var("ALLOWED_USER_IDS")
            .map_err(|_| ConfigError::MissingEnv("ALLOWED_USER_IDS"))?;
        Self::parse(bot_token, &raw)
    }

    fn parse(bot_token: String, raw_ids: &str) -> Result<Self, ConfigError> {
        let mut allowed_user_ids = Vec::new();
        for part in raw_ids.split(',') {
            let id = part.trim();
            if id.is_empty() {
                continue;
            }
            if !is_snowflake(id) {
                return Err(ConfigError::InvalidUserId(id.to_string()));
            }
            allowed_user_ids.push(id.to_string());
        }
        Ok(Self {
            bot_token,
            allowed_user_ids,
        })
    }

    pub fn is_allowed(&self, user_id: &str) -> bool {
        self.allowed_user_ids.iter().any(|id| id == user_id)
    }
}

/// How a schedule's agent-CLI session is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Main,
    Isolated,
}

impl Default for SessionMode {
    fn default() -> Self {
        SessionMode::Main
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleConfig {
    pub name: String,
    pub cron: String,
    pub timezone: String,
    pub prompt: String,
    #[serde(default)]
    pub discord_notify: bool,
    #[serde(default)]
    pub prompt_file: Option<String>,
    #[serde(default)]
    pub skippable: bool,
    #[serde(default)]
    pub session_mode: SessionMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Settings {
    #[serde(rename = "bypass-mode")]
    pub bypass_mode: bool,
    pub enable_sandbox: bool,
    pub claude_timeout_seconds: u32,
    pub discord_connection_heartbeat_interval_seconds: u32,
    pub discord_connection_reconnect_grace_seconds: u32,
    pub env: HashMap<String, String>,
    pub schedules: Vec<ScheduleConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bypass_mode: false,
            enable_sandbox: true,
            claude_timeout_seconds: 1800,
            discord_connection_heartbeat_interval_seconds: 60,
            discord_connection_reconnect_grace_seconds: 30,
            env: HashMap::new(),
            schedules: Vec::new(),
        }
    }
}

const RESERVED_ENV_KEYS: [&str; 2] = ["FORCE_COLOR", "CLAUDECODE"];

fn is_valid_env_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Settings {
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let settings: Settings =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range(
            "claude_timeout_seconds",
            self.claude_timeout_seconds as i64,
            10,
            7200,
        )?;
        check_range(
            "discord_connection_heartbeat_interval_seconds",
            self.discord_connection_heartbeat_interval_seconds as i64,
            10,
            300,
        )?;
        check_range(
            "discord_connection_reconnect_grace_seconds",
            self.discord_connection_reconnect_grace_seconds as i64,
            5,
            120,
        )?;
        for key in self.env.keys() {
            if !is_valid_env_key(key) {
                return Err(ConfigError::InvalidEnvKey(key.clone()));
            }
            if RESERVED_ENV_KEYS.contains(&key.as_str()) {
                return Err(ConfigError::ReservedEnvKey(key.clone()));
            }
        }
        Ok(())
    }
}

fn check_range(field: &'static str, value: i64, min: i64, max: i64) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            field,
            min,
            max,
            value,
        });
    }
    Ok(())
}
