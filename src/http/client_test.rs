use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderValue};
use serde_json::json;

use super::*;
use crate::http::{RefreshError, RetryMarker};
use crate::test_helpers::{self, MockReply, MockTransport, delayed_json_reply, json_reply};

const REFRESH: &str = "/auth/refresh-token";

fn client(transport: Arc<MockTransport>) -> AuthenticatedClient {
    let store = test_helpers::memory_store();
    store.set_session(test_helpers::admin_session());
    store.set_token(AccessToken::new("old"));
    AuthenticatedClient::new(transport, store, Navigation::new("/dashboard"), REFRESH, "/auth")
}

/// Backend where only `Bearer fresh` is accepted and refresh hands out `fresh`.
fn expiring_backend(refresh_delay: Duration) -> Arc<MockTransport> {
    MockTransport::new(move |req| {
        if req.path == REFRESH {
            return delayed_json_reply(refresh_delay, 200, json!({"access_token": "fresh"}));
        }
        if req.authorization() == Some("Bearer fresh") {
            json_reply(200, json!({"path": req.path}))
        } else {
            json_reply(401, json!({"message": "jwt expired"}))
        }
    })
}

// =============================================================================
// token attachment
// =============================================================================

#[tokio::test]
async fn attaches_current_token() {
    let transport = MockTransport::new(|_| json_reply(200, json!({})));
    let client = client(transport.clone());
    client.send(ApiRequest::get("/startups")).await.unwrap();
    assert_eq!(transport.calls()[0].authorization.as_deref(), Some("Bearer old"));
}

#[tokio::test]
async fn token_read_at_send_time() {
    let transport = MockTransport::new(|_| json_reply(200, json!({})));
    let client = client(transport.clone());
    let request = ApiRequest::get("/startups");
    client.store().set_token(AccessToken::new("newer"));
    client.send(request).await.unwrap();
    assert_eq!(transport.calls()[0].authorization.as_deref(), Some("Bearer newer"));
}

#[tokio::test]
async fn no_token_sends_without_header() {
    let transport = MockTransport::new(|_| json_reply(200, json!({})));
    let client = client(transport.clone());
    client.store().clear_token();
    client.send(ApiRequest::get("/public/stats")).await.unwrap();
    assert_eq!(transport.calls()[0].authorization, None);
}

#[tokio::test]
async fn explicit_authorization_is_respected() {
    let transport = MockTransport::new(|_| json_reply(200, json!({})));
    let client = client(transport.clone());
    let request = ApiRequest::get("/startups").header(AUTHORIZATION, HeaderValue::from_static("Bearer mine"));
    client.send(request).await.unwrap();
    assert_eq!(transport.calls()[0].authorization.as_deref(), Some("Bearer mine"));
}

// =============================================================================
// 401 handling
// =============================================================================

#[tokio::test]
async fn refreshes_and_replays_once() {
    let transport = expiring_backend(Duration::ZERO);
    let client = client(transport.clone());

    let body: serde_json::Value = client.get_json("/investors").await.unwrap();
    assert_eq!(body["path"], "/investors");

    let calls = transport.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0].retry, RetryMarker::Original);
    assert_eq!(calls[1].path, REFRESH);
    assert_eq!(calls[2].retry, RetryMarker::Retried);
    assert_eq!(calls[2].authorization.as_deref(), Some("Bearer fresh"));
    assert_eq!(client.store().token(), Some(AccessToken::new("fresh")));
}

#[tokio::test]
async fn replayed_401_is_returned() {
    let transport = MockTransport::new(|req| {
        if req.path == REFRESH {
            json_reply(200, json!({"access_token": "fresh"}))
        } else {
            json_reply(401, json!({"message": "still no"}))
        }
    });
    let client = client(transport.clone());

    let response = client.send(ApiRequest::get("/mentors")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(transport.count("/mentors"), 2);
    assert_eq!(transport.count(REFRESH), 1);
}

#[tokio::test]
async fn replayed_401_surfaces_as_status_from_helpers() {
    let transport = MockTransport::new(|req| {
        if req.path == REFRESH {
            json_reply(200, json!({"access_token": "fresh"}))
        } else {
            json_reply(401, json!({}))
        }
    });
    let client = client(transport);
    let err = client.get_json::<serde_json::Value>("/mentors").await.unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert!(!err.is_auth_failure());
}

#[tokio::test]
async fn concurrent_401s_share_one_refresh() {
    let transport = expiring_backend(Duration::from_millis(50));
    let client = client(transport.clone());

    let paths = ["/a", "/b", "/c", "/d", "/e"];
    let results = futures::future::join_all(paths.iter().map(|p| client.send(ApiRequest::get(*p)))).await;

    assert_eq!(transport.count(REFRESH), 1);
    for result in results {
        assert_eq!(result.unwrap().status(), StatusCode::OK);
    }
    for path in paths {
        assert_eq!(transport.count(path), 2);
    }
}

#[tokio::test]
async fn refresh_failure_expires_session() {
    let transport = MockTransport::new(|req| {
        if req.path == REFRESH {
            json_reply(401, json!({"message": "refresh expired"}))
        } else {
            json_reply(401, json!({}))
        }
    });
    let client = client(transport.clone());

    let err = client.send(ApiRequest::get("/contracts")).await.unwrap_err();
    assert!(err.is_auth_failure());
    assert!(matches!(err, ClientError::SessionExpired(RefreshError::Rejected { status: 401 })));
    assert_eq!(client.store().session(), None);
    assert_eq!(client.store().token(), None);
    assert!(!client.store().login_flag().is_set());
    assert_eq!(transport.count("/contracts"), 1);
}

#[tokio::test]
async fn stale_token_replays_without_refresh() {
    let store = test_helpers::memory_store();
    store.set_token(AccessToken::new("old"));

    // Another request rotates the token while this one is being answered.
    let rotating_store = store.clone();
    let transport = MockTransport::new(move |req| {
        if req.authorization() == Some("Bearer rotated") {
            return json_reply(200, json!({}));
        }
        rotating_store.set_token(AccessToken::new("rotated"));
        json_reply(401, json!({}))
    });
    let client = AuthenticatedClient::new(transport.clone(), store, Navigation::new("/dashboard"), REFRESH, "/auth");

    let response = client.send(ApiRequest::get("/reports")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let calls = transport.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].authorization.as_deref(), Some("Bearer old"));
    assert_eq!(calls[1].authorization.as_deref(), Some("Bearer rotated"));
    assert_eq!(transport.count(REFRESH), 0);
}

#[tokio::test]
async fn auth_area_401_is_not_refreshed() {
    let transport = MockTransport::new(|_| json_reply(401, json!({"message": "bad credentials"})));
    let client = client(transport.clone());
    client.navigation().navigate("/auth/login");

    let response = client.send(ApiRequest::post("/auth/login")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(transport.count(REFRESH), 0);
    assert!(client.store().is_authenticated());
}

#[tokio::test]
async fn logout_while_request_pending_does_not_refresh() {
    let transport = MockTransport::new(|req| {
        if req.path == REFRESH {
            json_reply(200, json!({"access_token": "resurrected"}))
        } else {
            delayed_json_reply(Duration::from_millis(50), 401, json!({}))
        }
    });
    let client = client(transport.clone());

    let pending = tokio::spawn({
        let client = client.clone();
        async move { client.send(ApiRequest::get("/startups")).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    client.store().clear();

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, ClientError::SessionExpired(RefreshError::SessionCleared)));
    assert_eq!(transport.count(REFRESH), 0);
    assert_eq!(client.store().token(), None);
    assert!(!client.store().login_flag().is_set());
}

#[tokio::test]
async fn late_401_after_failed_refresh_does_not_refresh_again() {
    let transport = MockTransport::new(|req| match req.path.as_str() {
        REFRESH => json_reply(401, json!({"message": "refresh expired"})),
        "/slow" => delayed_json_reply(Duration::from_millis(50), 401, json!({})),
        _ => json_reply(401, json!({})),
    });
    let client = client(transport.clone());

    let (fast, slow) = tokio::join!(client.send(ApiRequest::get("/fast")), client.send(ApiRequest::get("/slow")));

    assert!(matches!(fast.unwrap_err(), ClientError::SessionExpired(RefreshError::Rejected { status: 401 })));
    assert!(matches!(slow.unwrap_err(), ClientError::SessionExpired(RefreshError::SessionCleared)));
    assert_eq!(transport.count(REFRESH), 1);
    assert!(!client.store().is_authenticated());
    assert!(!client.store().login_flag().is_set());
}

// =============================================================================
// passthrough
// =============================================================================

#[tokio::test]
async fn other_statuses_pass_through() {
    let transport = MockTransport::new(|req| match req.path.as_str() {
        "/missing" => json_reply(404, json!({"message": "not found"})),
        "/denied" => json_reply(403, json!({"message": "forbidden"})),
        _ => json_reply(500, json!({})),
    });
    let client = client(transport.clone());

    for (path, status) in [("/missing", 404), ("/denied", 403), ("/broken", 500)] {
        let response = client.send(ApiRequest::get(path)).await.unwrap();
        assert_eq!(response.status().as_u16(), status);
    }
    assert_eq!(transport.count(REFRESH), 0);
    assert!(client.store().is_authenticated());
}

#[tokio::test]
async fn transport_error_passes_through() {
    let transport = MockTransport::new(|_| MockReply::Fail("timed out".into()));
    let client = client(transport.clone());
    let err = client.send(ApiRequest::get("/startups")).await.unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)));
    assert_eq!(transport.count(REFRESH), 0);
    assert!(client.store().is_authenticated());
}

#[tokio::test]
async fn post_json_sends_body() {
    let transport = MockTransport::new(|req| json_reply(201, req.body.clone().unwrap_or_default()));
    let client = client(transport);
    let echoed: serde_json::Value = client.post_json("/startups", &json!({"name": "Acme"})).await.unwrap();
    assert_eq!(echoed, json!({"name": "Acme"}));
}

#[tokio::test]
async fn delete_maps_error_status() {
    let transport = MockTransport::new(|_| json_reply(404, json!({})));
    let client = client(transport);
    assert_eq!(client.delete("/startups/7").await.unwrap_err().status(), Some(404));
}

// =============================================================================
// dispose
// =============================================================================

#[tokio::test]
async fn disposed_client_rejects_requests() {
    let transport = MockTransport::new(|_| json_reply(200, json!({})));
    let client = client(transport.clone());
    let clone = client.clone();
    client.dispose();

    assert!(clone.is_disposed());
    let err = clone.send(ApiRequest::get("/startups")).await.unwrap_err();
    assert!(matches!(err, ClientError::Disposed));
    assert!(transport.calls().is_empty());
}
