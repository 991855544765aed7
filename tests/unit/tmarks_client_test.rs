//! Unit tests for the remote API client's response handling.

use serde_json::json;

use tmarks::services::bookmark_sync::classify_api_error;
use tmarks::services::tmarks_client::{api_error_from_body, parse_add_bookmark, BookmarkApi, TmarksClient};
use tmarks::types::bookmark::BookmarkInput;
use tmarks::types::errors::FailureClass;

#[test]
fn test_error_body_with_nested_code() {
    let err = api_error_from_body(401, r#"{"error":{"code":"INVALID_API_KEY","message":"bad key"}}"#);
    assert_eq!(err.message, "bad key");
    assert_eq!(err.code.as_deref(), Some("INVALID_API_KEY"));
    assert_eq!(err.status, Some(401));
}

#[test]
fn test_error_body_with_plain_message() {
    assert_eq!(api_error_from_body(400, r#"{"error":"nope"}"#).message, "nope");
    assert_eq!(api_error_from_body(400, r#"{"message":"also nope"}"#).message, "also nope");
}

#[test]
fn test_error_body_that_is_not_json() {
    let err = api_error_from_body(502, "<html>Bad Gateway</html>");
    assert_eq!(err.message, "HTTP 502");
    assert_eq!(err.code, None);
    assert_eq!(classify_api_error(&err), FailureClass::Other);
}

#[test]
fn test_parse_add_bookmark_new() {
    let body = json!({"data": {"bookmark": {"id": "b1", "url": "https://example.com", "title": "Ex"}}});
    let outcome = parse_add_bookmark(&body).unwrap();

    assert_eq!(outcome.id, "b1");
    assert!(!outcome.is_existing);
    assert!(outcome.existing_bookmark.is_none());
}

#[test]
fn test_parse_add_bookmark_existing() {
    let body = json!({
        "data": {
            "is_existing": true,
            "existing_bookmark": {"id": "b2", "url": "https://example.com", "title": "Old"}
        }
    });
    let outcome = parse_add_bookmark(&body).unwrap();

    assert_eq!(outcome.id, "b2");
    assert!(outcome.is_existing);
    assert_eq!(outcome.existing_bookmark.unwrap().title, "Old");
}

#[test]
fn test_parse_add_bookmark_without_bookmark_is_invalid() {
    let err = parse_add_bookmark(&json!({"data": {}})).unwrap_err();
    assert_eq!(err.code.as_deref(), Some("INVALID_RESPONSE"));
}

#[tokio::test]
async fn test_missing_api_key_is_auth_failure() {
    let client = TmarksClient::new("http://127.0.0.1:1/api", None);
    assert!(!client.has_api_key());

    let err = client.get_tags().await.unwrap_err();

    assert_eq!(err.code.as_deref(), Some("MISSING_API_KEY"));
    assert_eq!(classify_api_error(&err), FailureClass::Auth);
}

#[tokio::test]
async fn test_unreachable_server_is_network_failure() {
    let client = TmarksClient::new("http://127.0.0.1:1/api/", Some("key".to_string()));

    let input = BookmarkInput {
        url: "https://example.com".to_string(),
        title: "Ex".to_string(),
        tags: vec!["rust".to_string()],
        ..Default::default()
    };
    let err = client.add_bookmark(&input).await.unwrap_err();

    assert_eq!(err.status, Some(0));
    assert_eq!(classify_api_error(&err), FailureClass::Network);
}

#[test]
fn test_blank_api_key_counts_as_missing() {
    let client = TmarksClient::new("http://127.0.0.1:1/api", Some("key".to_string()));
    client.set_api_key(Some("   ".to_string()));
    assert!(!client.has_api_key());
}
