use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Request-level failures of the webhook endpoints.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Handshake mode or token did not match
    #[error("Forbidden")]
    Unauthorized,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Malformed payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Unauthorized | GatewayError::InvalidSignature => StatusCode::FORBIDDEN,
            GatewayError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        // Parser details stay in the logs
        let message = match &self {
            GatewayError::MalformedPayload(_) => "Malformed payload".to_string(),
            other => other.to_string(),
        };
        (self.status(), Json(json!({ "error": message }))).into_response()
    }
}
