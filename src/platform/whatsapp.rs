use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::StoredMessage;

/// Discriminator for WhatsApp Business Account webhook payloads
pub const BUSINESS_ACCOUNT_OBJECT: &str = "whatsapp_business_account";

const TEXT_TYPE: &str = "text";

// ── Payload schema (every level optional) ──────────────────────────────────────
//
// Children are kept as raw values and decoded one element at a time, so a bad
// sibling at any level is skipped without losing the rest of the payload.

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    changes: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Change {
    #[serde(default)]
    value: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChangeValue {
    #[serde(default)]
    messages: Option<Value>,
    /// Delivery and read receipts
    #[serde(default)]
    statuses: Option<Value>,
}

/// Everything but `type`, which is read from the raw value first
#[derive(Debug, Deserialize)]
struct InboundMessage {
    from: Option<String>,
    id: Option<String>,
    timestamp: Option<Value>,
    text: Option<TextContent>,
}

#[derive(Debug, Deserialize)]
struct TextContent {
    body: Option<String>,
}

// ── Results ────────────────────────────────────────────────────────────────────

/// A message that claims to be processable but is missing required data
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MalformedMessage {
    #[error("message {id:?} has no type")]
    MissingType { id: Option<String> },
    #[error("text message {id:?} has no sender")]
    MissingSender { id: Option<String> },
    #[error("text message from {sender} has no id")]
    MissingId { sender: String },
    #[error("text message {id} has no text.body")]
    MissingBody { id: String },
    #[error("message could not be decoded: {0}")]
    Undecodable(String),
}

/// How a single entry of `value.messages` was handled
#[derive(Debug, Clone, PartialEq)]
pub enum MessageOutcome {
    Text(StoredMessage),
    /// Non-text types (image, audio, reaction, ...) are not stored
    Unsupported { kind: String },
    Malformed(MalformedMessage),
}

/// Summary of one webhook payload walk
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Extraction {
    pub stored: Vec<StoredMessage>,
    pub unsupported: usize,
    pub malformed: Vec<MalformedMessage>,
    pub statuses: usize,
}

impl Extraction {
    fn record(&mut self, outcome: MessageOutcome) {
        match outcome {
            MessageOutcome::Text(message) => self.stored.push(message),
            MessageOutcome::Unsupported { .. } => self.unsupported += 1,
            MessageOutcome::Malformed(err) => self.malformed.push(err),
        }
    }
}

// ── Walker ─────────────────────────────────────────────────────────────────────

/// Decode a verified body and collect its text messages.
/// Only a body that is not JSON at all is an error.
pub fn parse_payload(body: &[u8]) -> Result<Extraction, serde_json::Error> {
    let payload: Value = serde_json::from_slice(body)?;
    Ok(extract_messages(&payload))
}

/// Walk `entry[].changes[].value.messages[]` and classify every message.
/// Payloads for other objects yield nothing; a level with an unexpected shape
/// is skipped on its own.
pub fn extract_messages(payload: &Value) -> Extraction {
    let mut extraction = Extraction::default();

    let object = payload.get("object").and_then(Value::as_str);
    if object != Some(BUSINESS_ACCOUNT_OBJECT) {
        debug!("Ignoring webhook payload for object {:?}", object);
        return extraction;
    }

    for entry in decode_each::<Entry>(payload.get("entry"), "entry") {
        for change in decode_each::<Change>(entry.changes.as_ref(), "changes") {
            let Some(raw_value) = change.value else {
                continue;
            };
            let value = match ChangeValue::deserialize(&raw_value) {
                Ok(value) => value,
                Err(e) => {
                    warn!("Skipping change value with unexpected shape: {}", e);
                    continue;
                }
            };

            let statuses = items(value.statuses.as_ref(), "statuses");
            if !statuses.is_empty() {
                debug!("Received {} status update(s)", statuses.len());
                extraction.statuses += statuses.len();
            }

            for raw in items(value.messages.as_ref(), "messages") {
                let outcome = classify_message(raw);
                match &outcome {
                    MessageOutcome::Text(message) => {
                        info!("New text message from {} (id: {})", message.sender, message.id);
                        debug!("Text: {}", message.text);
                    }
                    MessageOutcome::Unsupported { kind } => {
                        debug!("Skipping non-text message of type '{}'", kind);
                    }
                    MessageOutcome::Malformed(err) => {
                        warn!("Skipping malformed message: {}", err);
                    }
                }
                extraction.record(outcome);
            }
        }
    }

    extraction
}

/// Elements of an optional array field. Absent or `null` is empty; any other
/// non-array is logged and treated as empty.
fn items<'a>(raw: Option<&'a Value>, field: &str) -> &'a [Value] {
    match raw {
        None | Some(Value::Null) => &[],
        Some(Value::Array(values)) => values,
        Some(other) => {
            warn!("Skipping '{}': expected an array, got {}", field, kind_of(other));
            &[]
        }
    }
}

/// Decode every element of an optional array, dropping only the ones that fail.
fn decode_each<T: DeserializeOwned>(raw: Option<&Value>, field: &str) -> Vec<T> {
    items(raw, field)
        .iter()
        .filter_map(|item| match T::deserialize(item) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!("Skipping element of '{}' with unexpected shape: {}", field, e);
                None
            }
        })
        .collect()
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Decide what to do with one raw message object.
/// Only messages that claim `type: text` are decoded further.
pub fn classify_message(raw: &Value) -> MessageOutcome {
    let Some(kind) = raw.get("type").and_then(Value::as_str) else {
        let id = raw.get("id").and_then(Value::as_str).map(str::to_string);
        return MessageOutcome::Malformed(MalformedMessage::MissingType { id });
    };

    if kind != TEXT_TYPE {
        return MessageOutcome::Unsupported {
            kind: kind.to_string(),
        };
    }

    let message = match InboundMessage::deserialize(raw) {
        Ok(m) => m,
        Err(e) => return MessageOutcome::Malformed(MalformedMessage::Undecodable(e.to_string())),
    };

    let Some(sender) = message.from else {
        return MessageOutcome::Malformed(MalformedMessage::MissingSender { id: message.id });
    };
    let Some(id) = message.id else {
        return MessageOutcome::Malformed(MalformedMessage::MissingId { sender });
    };
    let Some(text) = message.text.and_then(|t| t.body) else {
        return MessageOutcome::Malformed(MalformedMessage::MissingBody { id });
    };

    MessageOutcome::Text(StoredMessage {
        sender,
        text,
        id,
        timestamp: message.timestamp,
    })
}
