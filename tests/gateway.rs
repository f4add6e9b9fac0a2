//! HTTP gateway behavior, driven through the router without a socket.

mod common;

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tower::ServiceExt;

use eventide::auth::{Identity, IdentityVerifier, StaticTokenVerifier};
use eventide::gateway;

use common::{ScriptedProvider, harness};

const TOKEN: &str = "test-token";

fn app(provider: ScriptedProvider) -> Router {
    let h = harness(provider);
    let verifier: Arc<dyn IdentityVerifier> = Arc::new(
        StaticTokenVerifier::new().with_token(TOKEN, Identity::new("u1", "ada@example.com", "Ada")),
    );
    gateway::router(h.assistant, verifier)
}

fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"));
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_is_open() {
    let response = app(ScriptedProvider::new())
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "healthy");
}

#[tokio::test]
async fn test_api_requires_bearer() {
    let app = app(ScriptedProvider::new());

    let missing = app
        .clone()
        .oneshot(Request::get("/api/assistant/history").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(missing).await["error"]["code"], "unauthorized");

    let wrong = app
        .oneshot(
            Request::get("/api/assistant/history")
                .header(header::AUTHORIZATION, "Bearer nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_turn_then_history_round_trip() {
    let app = app(ScriptedProvider::new().then_say("Hello Ada, how can I help?"));

    let response = app
        .clone()
        .oneshot(request(Method::POST, "/api/assistant/turn", Some(json!({"message": "hi"}))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["reply"], "Hello Ada, how can I help?");
    assert_eq!(body["outcome"], "done");
    assert_eq!(body["toolsUsed"], json!([]));
    assert_eq!(body["affectedEventIds"], json!([]));

    let history = json_body(
        app.clone()
            .oneshot(request(Method::GET, "/api/assistant/history", None))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(history["messages"].as_array().unwrap().len(), 2);
    assert_eq!(history["messages"][0]["role"], "user");

    let cleared = json_body(
        app.oneshot(request(Method::DELETE, "/api/assistant/history", None))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(cleared["removed"], 2);
}

#[tokio::test]
async fn test_validation_error_shape() {
    let response = app(ScriptedProvider::new())
        .oneshot(request(Method::POST, "/api/assistant/turn", Some(json!({"message": ""}))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "validation_failed");
    assert_eq!(body["error"]["fields"][0]["field"], "message");
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let response = app(ScriptedProvider::new())
        .oneshot(request(Method::POST, "/api/assistant/turn", Some(json!({"text": "hi"}))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"]["fields"][0]["field"], "body");
}

#[tokio::test]
async fn test_rate_limited_agenda_sets_retry_after() {
    let agenda = r#"{"items": [{"title": "Standup", "startOffset": 0, "endOffset": 15}]}"#;
    let mut provider = ScriptedProvider::new();
    for _ in 0..5 {
        provider = provider.then_complete(agenda);
    }
    let app = app(provider);
    let body = json!({"title": "Standup", "durationMinutes": 15, "eventType": "team meeting"});

    for _ in 0..5 {
        let response = app
            .clone()
            .oneshot(request(Method::POST, "/api/assistant/agenda", Some(body.clone())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let agenda = json_body(response).await;
        assert_eq!(agenda["items"][0]["endOffset"], 15);
    }

    let response = app
        .oneshot(request(Method::POST, "/api/assistant/agenda", Some(body)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()[header::RETRY_AFTER], "60");
    let body = json_body(response).await;
    assert_eq!(body["error"]["retryAfterSeconds"], 60);
    assert_eq!(body["error"]["code"], "rate_limited");
}

#[tokio::test]
async fn test_cors_preflight_for_configured_origin() {
    let origins = vec!["https://app.example.com".to_string()];
    let cors = gateway::cors_layer(&origins).unwrap().unwrap();
    let app = app(ScriptedProvider::new()).layer(cors);

    let preflight = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/assistant/turn")
        .header(header::ORIGIN, "https://app.example.com")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(preflight).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://app.example.com"
    );

    assert!(gateway::cors_layer(&[]).unwrap().is_none());
    assert!(gateway::cors_layer(&["bad\norigin".to_string()]).is_err());
}
