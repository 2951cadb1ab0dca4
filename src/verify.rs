//! Request authenticity checks: the `hub.*` subscription handshake and the
//! `x-hub-signature-256` HMAC over the raw POST body.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use crate::error::GatewayError;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
const SIGNATURE_PREFIX: &str = "sha256=";
const SUBSCRIBE_MODE: &str = "subscribe";

/// Query parameters of the `GET /webhook` handshake. All optional so that a
/// missing parameter is a 403, not an extractor rejection.
#[derive(Debug, Default, Deserialize)]
pub struct HandshakeParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Echo the challenge if mode is `subscribe` and the token matches.
pub fn verify_handshake(
    params: HandshakeParams,
    verify_token: &str,
) -> Result<String, GatewayError> {
    let mode_ok = params.mode.as_deref() == Some(SUBSCRIBE_MODE);
    let token_ok = params
        .token
        .as_deref()
        .is_some_and(|token| bool::from(token.as_bytes().ct_eq(verify_token.as_bytes())));

    if mode_ok && token_ok {
        info!("Webhook verified (mode: subscribe)");
        Ok(params.challenge.unwrap_or_default())
    } else {
        warn!(
            "Webhook verification failed (mode: {:?}, token matched: {})",
            params.mode, token_ok
        );
        Err(GatewayError::Unauthorized)
    }
}

/// HMAC-SHA256 of `payload`, formatted the way the platform sends it:
/// `sha256=<lowercase hex>`.
pub fn sign_payload(secret: &str, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    format!("{}{}", SIGNATURE_PREFIX, hex::encode(mac.finalize().into_bytes()))
}

/// Check a signature header against the exact bytes received.
/// Must be called before the body is decoded: re-serialized JSON is not
/// byte-identical to what was signed.
pub fn verify_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    let expected = sign_payload(secret, payload);
    expected.as_bytes().ct_eq(signature.as_bytes()).into()
}
