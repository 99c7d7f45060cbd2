// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the bridge-daemon authors

//! Prompt assembly (`spec.md` §4.2 "Prompt assembly"). Only `{{token}}`
//! substitution — no general templating, per the Non-goal list.

use chrono::{DateTime, Local};

use super::AgentSource;

/// A snowflake-shaped author id, `^\d{17,20}$` (`spec.md` §4.2
/// "assistant_context ... only when source is `dm` and author id matches").
pub fn is_snowflake_author(author_id: &str) -> bool {
    (17..=20).contains(&author_id.len()) && author_id.bytes().all(|b| b.is_ascii_digit())
}

/// Builds the `{{assistant_context}}` block: a progress-hint section (only
/// for DM sources from a snowflake-shaped author) plus an attachment
/// descriptor section, concatenated when present.
pub fn build_assistant_context(
    source: AgentSource,
    author_id: Option<&str>,
    progress_hint: Option<&str>,
    attachment_names: &[String],
) -> Option<String> {
    let mut blocks = Vec::new();

    if source == AgentSource::Dm {
        if let (Some(author_id), Some(hint)) = (author_id, progress_hint) {
            if is_snowflake_author(author_id) && !hint.trim().is_empty() {
                blocks.push(hint.trim().to_string());
            }
        }
    }

    if !attachment_names.is_empty() {
        let list = attachment_names
            .iter()
            .map(|n| format!("- {n}"))
            .collect::<Vec<_>>()
            .join("\n");
        blocks.push(format!("Attachments:\n{list}"));
    }

    if blocks.is_empty() {
        None
    } else {
        Some(blocks.join("\n\n"))
    }
}

/// `user_input` is the trimmed message, or a placeholder when empty
/// (`spec.md` §4.2).
pub fn build_user_input(raw_message: &str) -> String {
    let trimmed = raw_message.trim();
    if trimmed.is_empty() {
        "(no message text)".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Substitutes `{{datetime}}`, `{{source}}`, `{{assistant_context}}`, and
/// `{{user_input}}` into the loaded template text.
pub fn assemble(
    template: &str,
    now: DateTime<Local>,
    source: AgentSource,
    assistant_context: Option<&str>,
    user_input: &str,
) -> String {
    template
        .replace("{{datetime}}", &now.format("%Y-%m-%d %H:%M").to_string())
        .replace("{{source}}", source.as_str())
        .replace("{{assistant_context}}", assistant_context.unwrap_or(""))
        .replace("{{user_input}}", user_input)
}

#[cfg(test)]
#[path = "prompt_tests.rs"]
mod tests;
