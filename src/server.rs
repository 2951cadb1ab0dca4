//! HTTP surface of the gateway.
//!
//! - `GET  /`          status and stored message count
//! - `GET  /privacy`   static privacy policy page
//! - `GET  /webhook`   subscription handshake (`hub.*` query parameters)
//! - `POST /webhook`   signed event delivery
//! - `GET  /messages`  everything stored so far

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
    response::Html,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::GatewayError;
use crate::memory::{LogSnapshot, MessageLog};
use crate::platform::whatsapp::parse_payload;
use crate::verify::{verify_handshake, verify_signature, HandshakeParams, SIGNATURE_HEADER};

// Embedded at compile time, no runtime file needed.
const PRIVACY_HTML: &str = include_str!("../static/privacy.html");

// ── Shared state ───────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    verify_token: Arc<str>,
    app_secret: Arc<str>,
    log: MessageLog,
}

impl AppState {
    pub fn new(config: &Config, log: MessageLog) -> Self {
        Self {
            verify_token: Arc::from(config.webhook.verify_token.as_str()),
            app_secret: Arc::from(config.webhook.app_secret.as_str()),
            log,
        }
    }
}

// ── Handlers ───────────────────────────────────────────────────────────────────

async fn home(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "WhatsApp Webhook Active",
        "messages_received": state.log.len().await,
    }))
}

async fn privacy_policy() -> Html<&'static str> {
    Html(PRIVACY_HTML)
}

async fn verify_webhook(
    State(state): State<AppState>,
    Query(params): Query<HandshakeParams>,
) -> Result<String, GatewayError> {
    verify_handshake(params, &state.verify_token)
}

async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, GatewayError> {
    // Signature is checked on the raw bytes, before any decoding
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if !verify_signature(&state.app_secret, &body, signature) {
        warn!("Rejected webhook with invalid signature ({} bytes)", body.len());
        return Err(GatewayError::InvalidSignature);
    }

    let extraction = parse_payload(&body).map_err(|e| {
        warn!("Signed webhook body is not valid JSON: {}", e);
        GatewayError::from(e)
    })?;

    info!(
        "Webhook processed: {} stored, {} unsupported, {} malformed, {} statuses",
        extraction.stored.len(),
        extraction.unsupported,
        extraction.malformed.len(),
        extraction.statuses
    );
    state.log.append_all(extraction.stored).await;

    Ok(Json(json!({ "status": "ok" })))
}

async fn list_messages(State(state): State<AppState>) -> Json<LogSnapshot> {
    Json(state.log.snapshot().await)
}

// ── Router / server ────────────────────────────────────────────────────────────

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/privacy", get(privacy_policy))
        .route("/webhook", get(verify_webhook).post(receive_webhook))
        .route("/messages", get(list_messages))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until Ctrl-C.
pub async fn serve(config: &Config, log: MessageLog) -> Result<()> {
    let app = router(AppState::new(config, log));

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("Webhook gateway listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Webhook gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WebhookConfig;
    use crate::verify::sign_payload;
    use axum::body::Body;
    use axum::http::{Method, Request, Response, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const TOKEN: &str = "test-verify-token";
    const SECRET: &str = "test-app-secret";

    fn test_app() -> (Router, MessageLog) {
        let config = Config {
            server: Default::default(),
            webhook: WebhookConfig {
                verify_token: TOKEN.to_string(),
                app_secret: SECRET.to_string(),
                allow_insecure_defaults: false,
            },
        };
        let log = MessageLog::new();
        (router(AppState::new(&config, log.clone())), log)
    }

    async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
        app.clone().oneshot(request).await.expect("oneshot request failed")
    }

    async fn body_bytes(response: Response<Body>) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    async fn body_json(response: Response<Body>) -> Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn signed_post(body: &str) -> Request<Body> {
        let signature = sign_payload(SECRET, body.as_bytes());
        post_with_signature(body, &signature)
    }

    fn post_with_signature(body: &str, signature: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/webhook")
            .header("content-type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn text_payload(id: &str, body: &str) -> String {
        json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "102290129340398",
                "changes": [{
                    "field": "messages",
                    "value": {
                        "messaging_product": "whatsapp",
                        "messages": [{
                            "from": "15551234567",
                            "id": id,
                            "timestamp": "1700000000",
                            "type": "text",
                            "text": { "body": body }
                        }]
                    }
                }]
            }]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_handshake_success_echoes_challenge() {
        let (app, _) = test_app();
        let uri = format!(
            "/webhook?hub.mode=subscribe&hub.verify_token={TOKEN}&hub.challenge=1158201444"
        );
        let response = send(&app, get_request(&uri)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(&body_bytes(response).await[..], b"1158201444");
    }

    #[tokio::test]
    async fn test_handshake_rejections() {
        let (app, _) = test_app();
        let uris = [
            "/webhook?hub.mode=subscribe&hub.verify_token=wrong&hub.challenge=1".to_string(),
            format!("/webhook?hub.mode=unsubscribe&hub.verify_token={TOKEN}&hub.challenge=1"),
            "/webhook".to_string(),
        ];
        for uri in uris {
            let response = send(&app, get_request(&uri)).await;
            assert_eq!(response.status(), StatusCode::FORBIDDEN, "{uri}");
            let body = body_bytes(response).await;
            assert!(!String::from_utf8_lossy(&body).contains(TOKEN));
        }
    }

    #[tokio::test]
    async fn test_text_message_is_stored_and_listed() {
        let (app, log) = test_app();
        let response = send(&app, signed_post(&text_payload("wamid.1", "hello"))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "status": "ok" }));
        assert_eq!(log.len().await, 1);

        let listing = body_json(send(&app, get_request("/messages")).await).await;
        assert_eq!(listing["total"], 1);
        assert_eq!(listing["messages"][0]["text"], "hello");
        assert_eq!(listing["messages"][0]["from"], "15551234567");
        assert_eq!(listing["messages"][0]["id"], "wamid.1");
        assert_eq!(listing["messages"][0]["timestamp"], "1700000000");

        let home = body_json(send(&app, get_request("/")).await).await;
        assert_eq!(home["messages_received"], 1);
    }

    #[tokio::test]
    async fn test_invalid_signature_is_rejected() {
        let (app, log) = test_app();
        let body = text_payload("wamid.1", "hello");

        let wrong = sign_payload("other-secret", body.as_bytes());
        let response = send(&app, post_with_signature(&body, &wrong)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let unsigned = Request::builder()
            .method(Method::POST)
            .uri("/webhook")
            .body(Body::from(body.clone()))
            .unwrap();
        let response = send(&app, unsigned).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        assert_eq!(log.len().await, 0);
    }

    #[tokio::test]
    async fn test_signature_over_reencoded_body_is_rejected() {
        let (app, log) = test_app();
        let original = r#"{"object": "whatsapp_business_account", "entry": []}"#;
        let reencoded =
            serde_json::to_string(&serde_json::from_str::<Value>(original).unwrap()).unwrap();

        // Signature of the compact form does not match the bytes actually sent
        let signature = sign_payload(SECRET, reencoded.as_bytes());
        let response = send(&app, post_with_signature(original, &signature)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(log.len().await, 0);
    }

    #[tokio::test]
    async fn test_zero_entries_is_ok_and_unchanged() {
        let (app, log) = test_app();
        let body = r#"{"object":"whatsapp_business_account","entry":[]}"#;
        let response = send(&app, signed_post(body)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "status": "ok" }));
        assert_eq!(log.len().await, 0);
    }

    #[tokio::test]
    async fn test_non_text_and_unrelated_payloads_are_ok() {
        let (app, log) = test_app();
        let image = json!({
            "object": "whatsapp_business_account",
            "entry": [{ "changes": [{ "value": { "messages": [{
                "from": "15551234567",
                "id": "wamid.img",
                "type": "image",
                "image": { "id": "media-1" }
            }]}}]}]
        })
        .to_string();
        let heartbeat = r#"{"hello":"world"}"#;

        for body in [image.as_str(), heartbeat] {
            let response = send(&app, signed_post(body)).await;
            assert_eq!(response.status(), StatusCode::OK);
        }
        assert_eq!(log.len().await, 0);
    }

    #[tokio::test]
    async fn test_malformed_message_keeps_rest_of_batch() {
        let (app, log) = test_app();
        let body = json!({
            "object": "whatsapp_business_account",
            "entry": [{ "changes": [{ "value": { "messages": [
                { "from": "1555", "id": "bad", "type": "text" },
                { "from": "1555", "id": "good", "type": "text", "text": { "body": "ok" } }
            ]}}]}]
        })
        .to_string();

        let response = send(&app, signed_post(&body)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let snapshot = log.snapshot().await;
        assert_eq!(snapshot.count, 1);
        assert_eq!(snapshot.messages[0].id, "good");
    }

    #[tokio::test]
    async fn test_signed_non_json_body_is_bad_request() {
        let (app, log) = test_app();
        let response = send(&app, signed_post("definitely not json")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(log.len().await, 0);
    }

    #[tokio::test]
    async fn test_privacy_page() {
        let (app, _) = test_app();
        let response = send(&app, get_request("/privacy")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
        assert!(content_type.starts_with("text/html"));
        let body = body_bytes(response).await;
        assert!(String::from_utf8_lossy(&body).contains("Privacy Policy"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_posts_store_every_message() {
        let (app, log) = test_app();
        let requests = (0..50).map(|i| {
            let app = app.clone();
            tokio::spawn(async move {
                let body = text_payload(&format!("wamid.{i}"), &format!("message {i}"));
                send(&app, signed_post(&body)).await.status()
            })
        });

        for status in futures::future::join_all(requests).await {
            assert_eq!(status.unwrap(), StatusCode::OK);
        }

        let snapshot = log.snapshot().await;
        assert_eq!(snapshot.count, 50);
        let mut ids: Vec<String> = snapshot.messages.into_iter().map(|m| m.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 50);

        let listing = body_json(send(&app, get_request("/messages")).await).await;
        assert_eq!(listing["total"], 50);
    }
}
