use reqwest::header::{AUTHORIZATION, HeaderValue};
use serde_json::json;

use super::*;

#[test]
fn builders_set_method_and_path() {
    let req = ApiRequest::post("/startups?page=2");
    assert_eq!(req.method, Method::POST);
    assert_eq!(req.path, "/startups?page=2");
    assert!(!req.has_authorization());
    assert_eq!(req.retry_marker(), RetryMarker::Original);
}

#[test]
fn json_body_is_attached() {
    let req = ApiRequest::put("/mentors/3").json(&json!({"name": "Grace"})).unwrap();
    assert_eq!(req.body, Some(json!({"name": "Grace"})));
}

#[test]
fn bearer_sets_sensitive_authorization() {
    let req = ApiRequest::get("/auth/me").bearer(&AccessToken::new("abc")).unwrap();
    assert_eq!(req.authorization(), Some("Bearer abc"));
    assert!(req.headers.get(AUTHORIZATION).unwrap().is_sensitive());
}

#[test]
fn explicit_header_is_kept() {
    let req = ApiRequest::get("/x").header(AUTHORIZATION, HeaderValue::from_static("Basic Zm9vOmJhcg=="));
    assert_eq!(req.authorization(), Some("Basic Zm9vOmJhcg=="));
}

#[test]
fn mark_retried_flips_marker() {
    let mut req = ApiRequest::delete("/contracts/9");
    assert!(!req.is_retry());
    req.mark_retried();
    assert!(req.is_retry());
    assert_eq!(req.retry_marker(), RetryMarker::Retried);
}

#[test]
fn response_json_and_text() {
    let resp = ApiResponse::from_json(StatusCode::OK, &json!({"id": 4}));
    assert!(resp.is_success());
    assert_eq!(resp.text(), r#"{"id":4}"#);
    let value: serde_json::Value = resp.json().unwrap();
    assert_eq!(value["id"], 4);
}

#[test]
fn response_decode_error() {
    let resp = ApiResponse::new(StatusCode::OK, HeaderMap::new(), b"not json".to_vec());
    let err = resp.json::<serde_json::Value>().unwrap_err();
    assert!(matches!(err, ClientError::Decode(_)));
}

#[test]
fn error_for_status_maps_non_success() {
    let resp = ApiResponse::new(StatusCode::NOT_FOUND, HeaderMap::new(), b"missing".to_vec());
    let err = resp.error_for_status().unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert!(!err.is_auth_failure());
    match err {
        ClientError::Status { body, .. } => assert_eq!(body, "missing"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn session_expired_is_auth_failure() {
    let err = ClientError::SessionExpired(RefreshError::Rejected { status: 401 });
    assert!(err.is_auth_failure());
    assert!(err.to_string().contains("401"));
}
