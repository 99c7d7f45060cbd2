// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the bridge-daemon authors

use super::*;

#[test]
fn terminal_codes_match_the_spec_set() {
    for code in TERMINAL_ERROR_CODES {
        let err = PlatformError::Api {
            code,
            message: "x".into(),
        };
        assert!(err.is_terminal());
    }
    let transient = PlatformError::Api {
        code: 50035,
        message: "rate limited".into(),
    };
    assert!(!transient.is_terminal());
}

#[test]
fn transport_errors_are_never_terminal() {
    assert!(!PlatformError::Transport("connection reset".into()).is_terminal());
}

#[test]
fn has_content_is_true_for_text_or_attachments() {
    let text_only = PlatformMessage {
        id: "1".into(),
        channel_id: "c".into(),
        author_id: "u".into(),
        is_bot: false,
        content: "hello".into(),
        attachments: vec![],
    };
    assert!(text_only.has_content());

    let attachment_only = PlatformMessage {
        content: "   ".into(),
        attachments: vec![PlatformAttachment {
            url: "https://x".into(),
            filename: "f.png".into(),
        }],
        ..text_only.clone()
    };
    assert!(attachment_only.has_content());

    let empty = PlatformMessage {
        content: "   ".into(),
        attachments: vec![],
        ..text_only
    };
    assert!(!empty.has_content());
}
