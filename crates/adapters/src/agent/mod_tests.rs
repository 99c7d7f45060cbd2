// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the bridge-daemon authors

use super::*;

#[test]
fn recognizes_all_three_auth_error_substrings() {
    assert!(is_auth_error_message(
        "Expected token to be set for this request, but none was present"
    ));
    assert!(is_auth_error_message("Not logged in to this provider"));
    assert!(is_auth_error_message("Please run /login to continue"));
}

#[test]
fn does_not_flag_unrelated_errors() {
    assert!(!is_auth_error_message("connection refused"));
}

#[test]
fn agent_error_auth_variant_is_always_an_auth_error() {
    let err = AgentError::Auth("Not logged in".to_string());
    assert!(err.is_auth_error());
}

#[test]
fn invocation_failed_is_an_auth_error_if_the_message_matches() {
    let err = AgentError::InvocationFailed("Please run /login".to_string());
    assert!(err.is_auth_error());
}
