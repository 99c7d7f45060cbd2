// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the bridge-daemon authors

//! Pure text-processing helpers shared by the outbound sender and scheduler
//! (`spec.md` §8, properties 6-8).

/// Discord's hard per-message limit, in Unicode scalar values (code points).
pub const MAX_CHUNK_LEN: usize = 2000;

/// Split `text` into chunks of at most `MAX_CHUNK_LEN` code points, preferring
/// to cut at the last newline, then the last space, within the window;
/// falling back to a hard cut. Chunks that are all-whitespace are dropped.
pub fn split_message(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let remaining = chars.len() - start;
        if remaining <= MAX_CHUNK_LEN {
            push_if_non_blank(&mut chunks, &chars[start..]);
            break;
        }

        let window_end = start + MAX_CHUNK_LEN;
        let cut = find_cut_point(&chars, start, window_end).unwrap_or(window_end);
        push_if_non_blank(&mut chunks, &chars[start..cut]);

        // Skip the boundary character we cut on (newline/space) so it isn't
        // duplicated at the front of the next chunk.
        let mut next = cut;
        if next < chars.len() && (chars[next] == '\n' || chars[next] == ' ') {
            next += 1;
        }
        start = next;
    }

    chunks
}

fn push_if_non_blank(chunks: &mut Vec<String>, slice: &[char]) {
    let s: String = slice.iter().collect();
    if !s.trim().is_empty() {
        chunks.push(s);
    }
}

/// Search backwards from `window_end` (exclusive) down to `start` for a
/// newline, then a space, returning the index to cut *before*.
fn find_cut_point(chars: &[char], start: usize, window_end: usize) -> Option<usize> {
    let search = |target: char| {
        (start..window_end)
            .rev()
            .find(|&i| chars[i] == target)
    };
    search('\n').or_else(|| search(' '))
}

/// True iff `trim(t)` starts or ends with the literal `"[SKIP]"`
/// (`spec.md` §8, property 7; §4.7 "Skippable schedule").
pub fn is_skip_response(t: &str) -> bool {
    let trimmed = t.trim();
    trimmed.starts_with("[SKIP]") || trimmed.ends_with("[SKIP]")
}

/// Remove every `<think>...</think>` span, including ones that span multiple
/// lines, preserving surrounding text exactly (`spec.md` §8, property 8;
/// §4.7).
pub fn strip_think_tags(t: &str) -> String {
    const OPEN: &str = "<think>";
    const CLOSE: &str = "</think>";
    let mut out = String::with_capacity(t.len());
    let mut rest = t;

    loop {
        match rest.find(OPEN) {
            Some(open_idx) => {
                out.push_str(&rest[..open_idx]);
                let after_open = &rest[open_idx + OPEN.len()..];
                match after_open.find(CLOSE) {
                    Some(close_idx) => {
                        rest = &after_open[close_idx + CLOSE.len()..];
                    }
                    None => {
                        // Unterminated tag: drop to end of string per the
                        // same "remove the span" rule, nothing left to keep.
                        rest = "";
                    }
                }
            }
            None => {
                out.push_str(rest);
                break;
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_message_respects_max_len() {
        let text = "a".repeat(5000);
        let chunks = split_message(&text);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= MAX_CHUNK_LEN);
            assert!(!chunk.trim().is_empty());
        }
    }

    #[test]
    fn split_message_prefers_newline_boundary() {
        let mut text = "x".repeat(1990);
        text.push('\n');
        text.push_str(&"y".repeat(1990));
        let chunks = split_message(&text);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "x".repeat(1990));
        assert_eq!(chunks[1], "y".repeat(1990));
    }

    #[test]
    fn split_message_falls_back_to_space() {
        let mut text = "w".repeat(1995);
        text.push(' ');
        text.push_str(&"z".repeat(1995));
        let chunks = split_message(&text);
        assert_eq!(chunks[0].chars().count(), 1995);
    }

    #[test]
    fn split_message_hard_cuts_when_no_boundary() {
        let text = "a".repeat(4500);
        let chunks = split_message(&text);
        assert_eq!(chunks[0].chars().count(), MAX_CHUNK_LEN);
    }

    #[test]
    fn split_message_drops_blank_chunks() {
        let text = format!("{}\n{}", "a".repeat(2000), "   ");
        let chunks = split_message(&text);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn is_skip_response_checks_both_edges() {
        assert!(is_skip_response("[SKIP]\nnothing to say"));
        assert!(is_skip_response("nothing to say\n[SKIP]"));
        assert!(is_skip_response("  [SKIP]  "));
        assert!(!is_skip_response("SKIP this please"));
    }

    #[test]
    fn strip_think_tags_removes_multiline_span() {
        let input = "before<think>\nsome\nreasoning\n</think>after";
        assert_eq!(strip_think_tags(input), "beforeafter");
    }

    #[test]
    fn strip_think_tags_removes_multiple_spans() {
        let input = "a<think>one</think>b<think>two</think>c";
        assert_eq!(strip_think_tags(input), "abc");
    }

    #[test]
    fn strip_think_tags_leaves_text_without_tags_untouched() {
        let input = "nothing to strip here";
        assert_eq!(strip_think_tags(input), input);
    }

    proptest::proptest! {
        #[test]
        fn split_message_never_exceeds_max_len(text in ".{0,6000}") {
            let chunks = split_message(&text);
            for chunk in chunks {
                proptest::prop_assert!(chunk.chars().count() <= MAX_CHUNK_LEN);
            }
        }
    }
}
