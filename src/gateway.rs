//! Stateless Gmail API wrapper
//!
//! Every call is parameterized by the current [`Session`]; the gateway itself
//! holds no authorization state.

use async_trait::async_trait;
use google_gmail1::{
    api::{Message, ModifyMessageRequest, WatchRequest},
    hyper_rustls, hyper_util, Gmail,
};
use tracing::debug;

use crate::error::{Result, TriageError};
use crate::models::{MailMessage, MailPart};
use crate::session::Session;

const GMAIL_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";

/// How many ids one listing call asks for; the pipeline only ever looks at
/// the most recent one
const LIST_PAGE_SIZE: u32 = 25;

/// Connector used for all Gmail API traffic
pub type GmailConnector =
    hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>;

/// Type alias for the Gmail hub to simplify signatures
pub type GmailHub = Gmail<GmailConnector>;

/// Result of a `users.watch` registration
#[derive(Debug, Clone)]
pub struct WatchStatus {
    pub history_id: Option<u64>,
    pub expiration: Option<i64>,
}

/// Narrow mail-provider seam so the pipeline is testable with fakes
#[async_trait]
pub trait MailGateway: Send + Sync {
    /// List inbox message ids in whatever order the provider returns them
    async fn list_message_ids(&self, session: &Session) -> Result<Vec<String>>;

    /// Fetch one message with its full body structure
    async fn get_message(&self, session: &Session, id: &str) -> Result<MailMessage>;

    /// Fetch the decoded bytes of one attachment
    async fn get_attachment(
        &self,
        session: &Session,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>>;

    /// Apply a label to a message
    async fn add_label(&self, session: &Session, message_id: &str, label_id: &str) -> Result<()>;

    /// Register a push subscription for the inbox against a Pub/Sub topic
    async fn register_watch(&self, session: &Session, topic: &str) -> Result<WatchStatus>;
}

#[async_trait]
impl<T: MailGateway + ?Sized> MailGateway for std::sync::Arc<T> {
    async fn list_message_ids(&self, session: &Session) -> Result<Vec<String>> {
        (**self).list_message_ids(session).await
    }

    async fn get_message(&self, session: &Session, id: &str) -> Result<MailMessage> {
        (**self).get_message(session, id).await
    }

    async fn get_attachment(
        &self,
        session: &Session,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>> {
        (**self).get_attachment(session, message_id, attachment_id).await
    }

    async fn add_label(&self, session: &Session, message_id: &str, label_id: &str) -> Result<()> {
        (**self).add_label(session, message_id, label_id).await
    }

    async fn register_watch(&self, session: &Session, topic: &str) -> Result<WatchStatus> {
        (**self).register_watch(session, topic).await
    }
}

/// Production gateway over the Gmail API
pub struct GmailGateway {
    connector: GmailConnector,
}

impl GmailGateway {
    /// Build the gateway with a TLS connector using native roots, HTTP/1
    pub fn new() -> Result<Self> {
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| TriageError::ConfigError(format!("Failed to load TLS roots: {}", e)))?
            .https_or_http()
            .enable_http1()
            .build();

        Ok(Self { connector })
    }

    /// Build a hub authorized with the session's bearer token
    ///
    /// The hub accepts a plain `String` as its token source, which is exactly
    /// the per-call session threading this service wants.
    fn hub_for(&self, session: &Session) -> GmailHub {
        let client =
            hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
                .build(self.connector.clone());
        Gmail::new(client, session.access_token().to_string())
    }
}

#[async_trait]
impl MailGateway for GmailGateway {
    async fn list_message_ids(&self, session: &Session) -> Result<Vec<String>> {
        let (_, response) = self
            .hub_for(session)
            .users()
            .messages_list("me")
            .add_label_ids("INBOX")
            .max_results(LIST_PAGE_SIZE)
            .add_scope(GMAIL_SCOPE)
            .doit()
            .await?;

        let ids: Vec<String> = response
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| m.id)
            .collect();

        debug!("Listed {} message ids for {}", ids.len(), session.identity());
        Ok(ids)
    }

    async fn get_message(&self, session: &Session, id: &str) -> Result<MailMessage> {
        let (_, message) = self
            .hub_for(session)
            .users()
            .messages_get("me", id)
            .format("full")
            .add_scope(GMAIL_SCOPE)
            .doit()
            .await?;

        parse_mail_message(message)
    }

    async fn get_attachment(
        &self,
        session: &Session,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>> {
        let (_, body) = self
            .hub_for(session)
            .users()
            .messages_attachments_get("me", message_id, attachment_id)
            .add_scope(GMAIL_SCOPE)
            .doit()
            .await?;

        body.data.ok_or_else(|| {
            TriageError::InvalidMessageFormat(format!(
                "attachment {} of message {} has no data",
                attachment_id, message_id
            ))
        })
    }

    async fn add_label(&self, session: &Session, message_id: &str, label_id: &str) -> Result<()> {
        let request = ModifyMessageRequest {
            add_label_ids: Some(vec![label_id.to_string()]),
            ..Default::default()
        };

        self.hub_for(session)
            .users()
            .messages_modify(request, "me", message_id)
            .add_scope(GMAIL_SCOPE)
            .doit()
            .await?;

        debug!("Applied label {} to message {}", label_id, message_id);
        Ok(())
    }

    async fn register_watch(&self, session: &Session, topic: &str) -> Result<WatchStatus> {
        let request = WatchRequest {
            topic_name: Some(topic.to_string()),
            label_ids: Some(vec!["INBOX".to_string()]),
            label_filter_action: Some("include".to_string()),
            ..Default::default()
        };

        let (_, response) = self
            .hub_for(session)
            .users()
            .watch(request, "me")
            .add_scope(GMAIL_SCOPE)
            .doit()
            .await?;

        Ok(WatchStatus {
            history_id: response.history_id,
            expiration: response.expiration,
        })
    }
}

/// Reduce the SDK message to the shape the pipeline works with: id, top-level
/// payload body, first level of parts
fn parse_mail_message(message: Message) -> Result<MailMessage> {
    let id = message
        .id
        .ok_or_else(|| TriageError::InvalidMessageFormat("missing message ID".to_string()))?;

    let payload = message.payload.unwrap_or_default();
    let body_data = payload.body.and_then(|b| b.data);

    let parts = payload
        .parts
        .unwrap_or_default()
        .into_iter()
        .map(|part| {
            let body = part.body.unwrap_or_default();
            MailPart {
                mime_type: part.mime_type.unwrap_or_default(),
                attachment_id: body.attachment_id,
                body_data: body.data,
            }
        })
        .collect();

    Ok(MailMessage {
        id,
        body_data,
        parts,
    })
}
