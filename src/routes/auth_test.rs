use super::*;
use axum::http::Request;

fn parts_with(header: &str, value: &str) -> Parts {
    let (parts, ()) = Request::builder()
        .header(header, value)
        .body(())
        .unwrap()
        .into_parts();
    parts
}

fn empty_parts() -> Parts {
    Request::builder().body(()).unwrap().into_parts().0
}

// =============================================================================
// bearer_token
// =============================================================================

#[test]
fn bearer_token_extracts_value() {
    let parts = parts_with("authorization", "Bearer abc123");
    assert_eq!(bearer_token(&parts), Some("abc123"));
}

#[test]
fn bearer_scheme_is_case_insensitive() {
    let parts = parts_with("authorization", "bearer abc123");
    assert_eq!(bearer_token(&parts), Some("abc123"));
}

#[test]
fn bearer_token_rejects_other_schemes() {
    let parts = parts_with("authorization", "Basic dXNlcjpwYXNz");
    assert_eq!(bearer_token(&parts), None);
}

#[test]
fn bearer_token_rejects_empty_token() {
    let parts = parts_with("authorization", "Bearer   ");
    assert_eq!(bearer_token(&parts), None);
}

#[test]
fn bearer_token_missing_header() {
    assert_eq!(bearer_token(&empty_parts()), None);
}

// =============================================================================
// api_key_header
// =============================================================================

#[test]
fn api_key_header_trims_value() {
    let parts = parts_with(API_KEY_HEADER, "  sk_abc  ");
    assert_eq!(api_key_header(&parts), Some("sk_abc"));
}

#[test]
fn api_key_header_blank_is_missing() {
    let parts = parts_with(API_KEY_HEADER, " ");
    assert_eq!(api_key_header(&parts), None);
}

#[test]
fn api_key_header_missing() {
    assert_eq!(api_key_header(&empty_parts()), None);
}
