pub mod whatsapp;

use serde::Serialize;

/// A text message received from the platform, as kept in the log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredMessage {
    /// Platform sender identifier (phone number for WhatsApp), unvalidated
    #[serde(rename = "from")]
    pub sender: String,
    /// The message text
    pub text: String,
    /// Upstream message ID, not necessarily unique
    pub id: String,
    /// Upstream send time, passed through as received (string or number)
    pub timestamp: Option<serde_json::Value>,
}
