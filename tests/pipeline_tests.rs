// End-to-end tests for the assembled router
//
// Tests cover:
// - Stage ordering as seen by a client
// - Exactly one security event per rejection
// - Security headers on admitted and rejected responses
// - Body ceilings on the upload and regular routes
// - Token expiry against an injected clock
// - SQLite-backed event log

use axum::{
    Router,
    body::{Body, to_bytes},
    extract::ConnectInfo,
    http::{Request, Response, StatusCode, header},
};
use boqmate_shield::api::{app_state::AppState, create_router};
use boqmate_shield::config::config::AppConfig;
use boqmate_shield::security::clock::{Clock, ManualClock};
use boqmate_shield::security::events::{EventType, SecurityEventLog, Severity};
use boqmate_shield::security::identity::ClientIdentity;
use boqmate_shield::security::middleware::SECURITY_HEADERS;
use boqmate_shield::security::pipeline::SecurityPipeline;
use boqmate_shield::storage::{MemoryEventStore, SecurityEventRepository, SqliteEventStore};
use chrono::{Duration, TimeZone, Utc};
use rstest::rstest;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "e2e-boundary";

struct App {
    router: Router,
    pipeline: Arc<SecurityPipeline>,
    clock: Arc<ManualClock>,
    repository: Arc<dyn SecurityEventRepository>,
}

impl App {
    fn new() -> Self {
        Self::with_config(AppConfig::development())
    }

    fn with_config(config: AppConfig) -> Self {
        Self::build(config, Arc::new(MemoryEventStore::new()))
    }

    fn build(config: AppConfig, repository: Arc<dyn SecurityEventRepository>) -> Self {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 6, 2, 8, 30, 0).unwrap(),
        ));
        let events = SecurityEventLog::new(repository.clone(), clock.clone() as Arc<dyn Clock>);
        let pipeline = Arc::new(
            SecurityPipeline::from_config(&config, events, clock.clone() as Arc<dyn Clock>)
                .unwrap(),
        );
        let router = create_router(AppState::in_memory(pipeline.clone()), &config);
        Self {
            router,
            pipeline,
            clock,
            repository,
        }
    }

    fn token(&self, subject: &str) -> String {
        self.pipeline.authenticator().issue_default(subject).unwrap()
    }

    async fn send(&self, req: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(req).await.unwrap()
    }

    async fn event_types(&self) -> Vec<EventType> {
        let now = self.clock.now();
        let mut events = self
            .repository
            .events_between(now - Duration::days(1), now + Duration::days(1))
            .await
            .unwrap();
        events.reverse();
        events.into_iter().map(|e| e.event_type).collect()
    }
}

fn get(uri: &str, ip: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("x-forwarded-for", ip)
        .body(Body::empty())
        .unwrap()
}

fn authed_get(uri: &str, ip: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("x-forwarded-for", ip)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, ip: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("x-forwarded-for", ip)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn upload(ip: &str, token: Option<&str>, filename: &str, content: Vec<u8>) -> Request<Body> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
         Content-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(&content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/generate-boq")
        .header("x-forwarded-for", ip)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::from(body)).unwrap()
}

async fn json_body(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn assert_security_headers(response: &Response<Body>) {
    for (name, value) in SECURITY_HEADERS {
        assert_eq!(response.headers()[name], value, "{name}");
    }
}

#[tokio::test]
async fn test_oversized_upload_rejected_before_auth() {
    let app = App::new();
    let content = vec![b'a'; 60 * 1024 * 1024];

    let response = app.send(upload("203.0.113.10", None, "huge.pdf", content)).await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_security_headers(&response);
    let body = json_body(response).await;
    assert_eq!(body["code"], "UPLOAD_REJECTED");
    assert_eq!(body["message"], "File too large");
    assert_eq!(app.event_types().await, vec![EventType::FileTooLarge]);
}

#[tokio::test]
async fn test_declared_length_over_ceiling_is_refused_unread() {
    let mut config = AppConfig::development();
    config.server.max_request_size = 1024;
    let app = App::with_config(config);

    let req = Request::builder()
        .method("POST")
        .uri("/api/files")
        .header("x-forwarded-for", "203.0.113.11")
        .header(header::CONTENT_LENGTH, "4096")
        .header("content-type", "text/plain")
        .body(Body::from("short"))
        .unwrap();

    let response = app.send(req).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["message"], "Request too large");
    assert_eq!(app.event_types().await, vec![EventType::RequestTooLarge]);
}

#[rstest]
#[case("/api/files")]
#[case("/metrics")]
#[case("/api/files/abc/download")]
#[tokio::test]
async fn test_protected_routes_need_a_token(#[case] uri: &str) {
    let app = App::new();
    let response = app.send(get(uri, "203.0.113.12")).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_security_headers(&response);
    assert_eq!(app.event_types().await, vec![EventType::MissingAuth]);
}

#[rstest]
#[case("/")]
#[case("/health")]
#[case("/api/categories")]
#[tokio::test]
async fn test_public_routes_need_no_token(#[case] uri: &str) {
    let app = App::new();
    let response = app.send(get(uri, "203.0.113.13")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_security_headers(&response);
    assert!(app.event_types().await.is_empty());
}

#[tokio::test]
async fn test_blocked_identity_is_refused_everywhere() {
    let app = App::new();
    let client = ClientIdentity::from("198.51.100.7");
    assert!(app.pipeline.block_identity(&client, "manual"));

    let response = app.send(get("/health", "198.51.100.7")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_security_headers(&response);
    let body = json_body(response).await;
    assert_eq!(body["code"], "ACCESS_DENIED");
    assert_eq!(body["message"], "Access denied");

    let response = app.send(get("/health", "198.51.100.8")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.event_types().await, vec![EventType::BlockedIpAccess]);
}

#[tokio::test]
async fn test_rate_limit_then_block() {
    let mut config = AppConfig::development();
    config.security.rate_limit_requests = 3;
    config.security.rate_limit_window_seconds = 60;
    let app = App::with_config(config);

    for _ in 0..3 {
        let response = app.send(get("/health", "192.0.2.50")).await;
        assert_eq!(response.status(), StatusCode::OK);
        app.clock.advance(Duration::seconds(10));
    }

    let response = app.send(get("/health", "192.0.2.50")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()[header::RETRY_AFTER], "30");
    assert_security_headers(&response);

    // promoted to the block list even once the window has drained
    app.clock.advance(Duration::seconds(120));
    let response = app.send(get("/health", "192.0.2.50")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    assert_eq!(
        app.event_types().await,
        vec![EventType::RateLimitExceeded, EventType::BlockedIpAccess]
    );
}

#[tokio::test]
async fn test_malicious_json_rejected_before_auth() {
    let app = App::new();
    let payload = json!({
        "project": "Tower B",
        "notes": ["<script>alert(1)</script>", "x".repeat(300)],
    });

    let response = app.send(post_json("/api/files", "192.0.2.60", payload)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["code"], "INVALID_INPUT");
    assert_eq!(body["message"], "Invalid input detected");

    let now = app.clock.now();
    let events = app
        .repository
        .events_between(now - Duration::minutes(1), now)
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::MaliciousInput);
    assert_eq!(events[0].severity, Severity::Error);
    assert_eq!(events[0].details["path"], "/api/files");
    assert_eq!(events[0].details["method"], "POST");
    let preview = events[0].details["body_preview"].as_str().unwrap();
    assert!(preview.chars().count() <= 103);
}

#[tokio::test]
async fn test_payload_in_json_key_rejected_before_auth() {
    let app = App::new();
    let payload = json!({ "<script>alert(1)</script>": "ok", "../../etc/passwd": 1 });

    let response = app.send(post_json("/api/files", "192.0.2.61", payload)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["code"], "INVALID_INPUT");
    assert_eq!(app.event_types().await, vec![EventType::MaliciousInput]);
}

#[tokio::test]
async fn test_malicious_query_param_on_state_changing_request() {
    let app = App::new();
    let req = Request::builder()
        .method("DELETE")
        .uri("/api/files?path=..%2F..%2Fetc%2Fpasswd")
        .header("x-forwarded-for", "192.0.2.61")
        .body(Body::empty())
        .unwrap();

    let response = app.send(req).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["message"], "Invalid query parameter");
    assert_eq!(app.event_types().await, vec![EventType::MaliciousQueryParam]);
}

#[tokio::test]
async fn test_expired_token_is_refused() {
    let app = App::new();
    let token = app.token("estimator-7");

    let response = app.send(authed_get("/api/files", "192.0.2.70", &token)).await;
    assert_eq!(response.status(), StatusCode::OK);

    app.clock.advance(Duration::hours(2));
    let response = app.send(authed_get("/api/files", "192.0.2.70", &token)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["message"], "Invalid or expired token");
    assert_eq!(app.event_types().await, vec![EventType::ExpiredToken]);
}

#[tokio::test]
async fn test_tampered_token_is_refused() {
    let app = App::new();
    let mut token = app.token("estimator-7");
    token.push('x');

    let response = app.send(authed_get("/api/files", "192.0.2.71", &token)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(app.event_types().await, vec![EventType::InvalidToken]);
}

#[tokio::test]
async fn test_disallowed_extension_rejected() {
    let app = App::new();
    let token = app.token("estimator-8");

    let response = app
        .send(upload("192.0.2.80", Some(&token), "payload.exe", b"MZ".to_vec()))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["message"], "Invalid file type");
    assert_eq!(app.event_types().await, vec![EventType::InvalidFileType]);
}

#[tokio::test]
async fn test_upload_stored_for_authenticated_subject() {
    let app = App::new();
    let token = app.token("estimator-9");

    let response = app
        .send(upload(
            "192.0.2.90",
            Some(&token),
            "levels.txt",
            b"slab thickness 200mm".to_vec(),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_security_headers(&response);
    let body = json_body(response).await;
    assert_eq!(body["filename"], "levels.txt");
    assert_eq!(body["size"], 20);
    assert!(app.event_types().await.is_empty());
}

#[tokio::test]
async fn test_peer_address_used_when_forwarding_not_trusted() {
    let mut config = AppConfig::development();
    config.security.trust_forwarded_header = false;
    let app = App::with_config(config);
    app.pipeline
        .block_identity(&ClientIdentity::from("10.9.8.7"), "manual");

    let mut req = get("/health", "203.0.113.99");
    req.extensions_mut()
        .insert(ConnectInfo("10.9.8.7:40000".parse::<SocketAddr>().unwrap()));

    let response = app.send(req).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_events_persist_to_sqlite() {
    let store = Arc::new(SqliteEventStore::in_memory().unwrap());
    let app = App::build(AppConfig::development(), store.clone());

    app.send(get("/api/files", "192.0.2.100")).await;
    app.send(get("/api/files", "192.0.2.100")).await;
    app.send(get("/metrics", "192.0.2.101")).await;

    assert_eq!(store.count().await.unwrap(), 3);
    let summary = app
        .pipeline
        .events()
        .summarize(Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.by_event_type["MISSING_AUTH"], 3);
    assert_eq!(summary.by_ip_address["192.0.2.100"], 2);
}
