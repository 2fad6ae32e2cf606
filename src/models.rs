use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TriageError};

/// A mail message reduced to what the triage pipeline needs: its id, the
/// top-level body payload and the first level of body parts
#[derive(Debug, Clone, Default)]
pub struct MailMessage {
    pub id: String,
    /// Decoded top-level payload body, if the message has one
    pub body_data: Option<Vec<u8>>,
    pub parts: Vec<MailPart>,
}

/// One body part of a message
#[derive(Debug, Clone, Default)]
pub struct MailPart {
    pub mime_type: String,
    /// Set when the part's content lives behind a separate attachment fetch
    pub attachment_id: Option<String>,
    /// Decoded inline body data, if present
    pub body_data: Option<Vec<u8>>,
}

impl MailPart {
    /// Whether the declared media type marks this part as an image
    pub fn is_image(&self) -> bool {
        self.mime_type.contains("image")
    }
}

/// An image pulled out of a message, alive for one pipeline run
#[derive(Debug, Clone, PartialEq)]
pub enum Image {
    /// `src` of an `<img>` tag found in an HTML body
    Url(String),
    /// Decoded bytes of an image attachment
    Bytes(Vec<u8>),
}

/// Pub/Sub push envelope as delivered to the notification endpoint
#[derive(Debug, Deserialize)]
pub struct PubSubEnvelope {
    pub message: PubSubMessage,
    #[serde(default)]
    pub subscription: Option<String>,
}

/// The message half of a push envelope; `data` is base64-encoded JSON
#[derive(Debug, Deserialize)]
pub struct PubSubMessage {
    pub data: String,
    #[serde(rename = "messageId", default)]
    pub message_id: Option<String>,
}

/// Decoded Gmail push notification payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushNotification {
    #[serde(rename = "emailAddress")]
    pub email_address: String,
    #[serde(rename = "historyId", default)]
    pub history_id: Option<u64>,
}

impl PushNotification {
    /// Decode a push notification from the raw envelope body
    pub fn from_envelope(body: &[u8]) -> Result<Self> {
        let envelope: PubSubEnvelope = serde_json::from_slice(body)
            .map_err(|e| TriageError::InvalidInput(format!("invalid push envelope: {}", e)))?;

        let decoded = STANDARD
            .decode(&envelope.message.data)
            .map_err(|e| TriageError::InvalidInput(format!("invalid base64 data: {}", e)))?;

        serde_json::from_slice(&decoded)
            .map_err(|e| TriageError::InvalidInput(format!("invalid notification data: {}", e)))
    }
}
