//! Access-control API client integration tests
//!
//! Runs the client against a wiremock server:
//! - Login, token cache and refresh coalescing
//! - Pagination over `page`/`paginate`
//! - Event date filter
//! - Error surfaces (401 invalidation, status errors, malformed records)

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use access_sync::api::{AccessControlSource, ApiClient, ClientConfig, EventWindow};
use access_sync::SyncError;
use chrono::{TimeZone, Utc};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> ClientConfig {
    ClientConfig {
        base_url: server.uri(),
        user: Some("svc".to_string()),
        password: Some("secret".to_string()),
        token_cache_path: None,
        ..Default::default()
    }
}

fn login_response(token: &str) -> ResponseTemplate {
    let expires = (Utc::now() + chrono::Duration::hours(1)).to_rfc3339();
    ResponseTemplate::new(200).set_body_json(json!({
        "accessToken": token,
        "authenticationType": "Bearer",
        "expirationDate": expires,
    }))
}

async fn mount_login(server: &MockServer, token: &str, expected: u64) {
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(query_param("type", "password"))
        .respond_with(login_response(token))
        .expect(expected)
        .mount(server)
        .await;
}

fn write_cache(path: &Path, token: &str, expires_in: chrono::Duration) {
    let expires = (Utc::now() + expires_in).to_rfc3339();
    std::fs::write(
        path,
        json!({"accessToken": token, "expirationDate": expires}).to_string(),
    )
    .unwrap();
}

fn event(id: i64) -> serde_json::Value {
    json!({
        "id": id,
        "source_date": "2024-03-01T10:00:00Z",
        "sia_code": "DO",
        "unit": "Door 1",
        "identifier": null
    })
}

// =============================================================================
// Token lifecycle
// =============================================================================

#[tokio::test]
async fn test_login_once_then_reuse() {
    let server = MockServer::start().await;
    mount_login(&server, "tok-1", 1).await;

    Mock::given(method("GET"))
        .and(path("/badges"))
        .and(header("authorization", "Bearer tok-1"))
        .and(query_param("include", "identifier,user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"id": 1, "user": {"id": 42}},
                {"id": 2, "identifier": {"computedIdentifier": "W26-2"}}
            ],
            "meta": {"current_page": 1, "last_page": 1}
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = ApiClient::new(config(&server)).unwrap();
    assert_eq!(client.fetch_badges().await.unwrap().len(), 2);
    assert_eq!(client.fetch_badges().await.unwrap().len(), 2);
    assert_eq!(client.tokens().login_count(), 1);
}

#[tokio::test]
async fn test_valid_cached_token_skips_login() {
    let server = MockServer::start().await;
    mount_login(&server, "fresh", 0).await;

    Mock::given(method("GET"))
        .and(path("/accesses"))
        .and(header("authorization", "Bearer cached"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(2)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let cache = dir.path().join("client-token.json");
    write_cache(&cache, "cached", chrono::Duration::minutes(10));

    let client = ApiClient::new(ClientConfig {
        token_cache_path: Some(cache),
        ..config(&server)
    })
    .unwrap();

    client.fetch_accesses().await.unwrap();
    client.fetch_accesses().await.unwrap();
    assert_eq!(client.tokens().login_count(), 0);
}

#[tokio::test]
async fn test_cached_token_inside_skew_is_refreshed() {
    let server = MockServer::start().await;
    mount_login(&server, "fresh", 1).await;

    Mock::given(method("GET"))
        .and(path("/accesses"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let cache = dir.path().join("client-token.json");
    write_cache(&cache, "stale", chrono::Duration::seconds(30));

    let client = ApiClient::new(ClientConfig {
        token_cache_path: Some(cache.clone()),
        ..config(&server)
    })
    .unwrap();
    client.fetch_accesses().await.unwrap();

    // The new token replaced the stale one on disk
    let raw = std::fs::read_to_string(&cache).unwrap();
    assert!(raw.contains("\"accessToken\":\"fresh\""));
}

#[tokio::test]
async fn test_concurrent_callers_share_one_login() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(login_response("shared").set_delay(Duration::from_millis(200)))
        .expect(1)
        .mount(&server)
        .await;

    let client = Arc::new(ApiClient::new(config(&server)).unwrap());
    let callers = (0..5).map(|_| {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.tokens().valid_credential().await })
    });

    for result in futures::future::join_all(callers).await {
        assert_eq!(result.unwrap().unwrap().token, "shared");
    }
    assert_eq!(client.tokens().login_count(), 1);
}

#[tokio::test]
async fn test_concurrent_callers_share_one_failed_login() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(
            ResponseTemplate::new(503)
                .set_body_string("auth backend down")
                .set_delay(Duration::from_millis(200)),
        )
        .expect(2)
        .mount(&server)
        .await;

    let client = Arc::new(ApiClient::new(config(&server)).unwrap());
    let callers = (0..5).map(|_| {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.tokens().valid_credential().await })
    });

    for result in futures::future::join_all(callers).await {
        let err = result.unwrap().unwrap_err();
        assert!(matches!(err, SyncError::Auth(ref msg) if msg.contains("503")));
    }
    assert_eq!(client.tokens().login_count(), 1);

    // The failure is not remembered; the next caller tries again
    assert!(client.tokens().valid_credential().await.is_err());
    assert_eq!(client.tokens().login_count(), 2);
}

#[tokio::test]
async fn test_rejected_login_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(403).set_body_string("bad credentials"))
        .mount(&server)
        .await;

    let client = ApiClient::new(config(&server)).unwrap();
    let err = client.fetch_events(EventWindow::Full).await.unwrap_err();
    assert!(matches!(err, SyncError::Auth(_)));
}

#[tokio::test]
async fn test_login_without_token_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"authenticationType": "Bearer"})))
        .mount(&server)
        .await;

    let client = ApiClient::new(config(&server)).unwrap();
    let err = client.tokens().valid_credential().await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Authentication error: missing bearer token in auth response"
    );
}

#[tokio::test]
async fn test_unauthorized_response_forces_new_login() {
    let server = MockServer::start().await;
    mount_login(&server, "tok", 2).await;

    Mock::given(method("GET"))
        .and(path("/events"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [event(1)]})))
        .mount(&server)
        .await;

    let client = ApiClient::new(config(&server)).unwrap();
    let err = client.fetch_events(EventWindow::Full).await.unwrap_err();
    assert!(matches!(err, SyncError::Status { status: 401, .. }));

    let events = client.fetch_events(EventWindow::Full).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(client.tokens().login_count(), 2);
}

// =============================================================================
// Pagination
// =============================================================================

#[tokio::test]
async fn test_pages_until_short_page() {
    let server = MockServer::start().await;
    mount_login(&server, "tok", 1).await;

    let pages = [vec![event(1), event(2)], vec![event(3), event(4)], vec![event(5)]];
    for (i, data) in pages.iter().enumerate() {
        Mock::given(method("GET"))
            .and(path("/events"))
            .and(query_param("page", (i + 1).to_string()))
            .and(query_param("paginate", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": data})))
            .expect(1)
            .mount(&server)
            .await;
    }

    let client = ApiClient::new(ClientConfig {
        page_size: 2,
        ..config(&server)
    })
    .unwrap();

    let events = client.fetch_events(EventWindow::Full).await.unwrap();
    let ids: Vec<i64> = events.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_meta_pages_followed_past_short_pages() {
    let server = MockServer::start().await;
    mount_login(&server, "tok", 1).await;

    for page in 1..=3u32 {
        Mock::given(method("GET"))
            .and(path("/users"))
            .and(query_param("page", page.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"id": page}],
                "links": {},
                "meta": {"current_page": page, "last_page": 3}
            })))
            .expect(1)
            .mount(&server)
            .await;
    }

    let client = ApiClient::new(config(&server)).unwrap();
    assert_eq!(client.fetch_users().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_malformed_records_are_quarantined() {
    let server = MockServer::start().await;
    mount_login(&server, "tok", 1).await;

    Mock::given(method("GET"))
        .and(path("/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [event(1), {"id": 2, "source_date": "2024-03-01T10:00:00Z"}, event(3)]
        })))
        .mount(&server)
        .await;

    let client = ApiClient::new(config(&server)).unwrap();
    let events = client.fetch_events(EventWindow::Full).await.unwrap();
    let ids: Vec<i64> = events.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![1, 3]);
}

#[tokio::test]
async fn test_server_error_is_status_error() {
    let server = MockServer::start().await;
    mount_login(&server, "tok", 1).await;

    Mock::given(method("GET"))
        .and(path("/badges"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let client = ApiClient::new(config(&server)).unwrap();
    match client.fetch_badges().await.unwrap_err() {
        SyncError::Status { status, body, .. } => {
            assert_eq!(status, 503);
            assert_eq!(body, "maintenance");
        }
        other => panic!("unexpected error: {}", other),
    }
}

// =============================================================================
// Event window
// =============================================================================

#[tokio::test]
async fn test_incremental_window_sends_date_filter() {
    let server = MockServer::start().await;
    mount_login(&server, "tok", 1).await;

    Mock::given(method("GET"))
        .and(path("/events"))
        .and(query_param("date", "after:2024-03-01T10:00:00.123Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [event(9)]})))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::new(config(&server)).unwrap();
    let since = Utc.timestamp_millis_opt(1_709_287_200_123).unwrap();
    let events = client.fetch_events(EventWindow::After(since)).await.unwrap();
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn test_full_window_sends_no_date_filter() {
    let server = MockServer::start().await;
    mount_login(&server, "tok", 1).await;

    Mock::given(method("GET"))
        .and(path("/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::new(config(&server)).unwrap();
    client.fetch_events(EventWindow::Full).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let events_request = requests
        .iter()
        .find(|r| r.url.path() == "/events")
        .unwrap();
    assert!(events_request.url.query_pairs().all(|(k, _)| k != "date"));
    assert!(events_request
        .url
        .query_pairs()
        .any(|(k, v)| k == "page" && v == "1"));
}
