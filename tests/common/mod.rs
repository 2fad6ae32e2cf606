//! Common test utilities and fixtures
//!
//! Hand-written fakes at the store/gateway/classifier seams so pipeline and
//! session behavior can be tested without any provider.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{Duration, Utc};

use gmail_triage::auth::AppSecret;
use gmail_triage::classify::{ImageAnnotation, LabelClassifier};
use gmail_triage::error::{Result, TriageError};
use gmail_triage::gateway::{MailGateway, WatchStatus};
use gmail_triage::models::{Image, MailMessage, MailPart};
use gmail_triage::session::Session;
use gmail_triage::store::{CredentialRecord, CredentialStore};

/// In-memory credential store counting writes
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, CredentialRecord>>,
    puts: AtomicUsize,
}

impl MemoryStore {
    pub fn with_record(record: CredentialRecord) -> Self {
        let store = Self::default();
        store
            .records
            .lock()
            .unwrap()
            .insert(record.identity.clone(), record);
        store
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn record(&self, identity: &str) -> Option<CredentialRecord> {
        self.records.lock().unwrap().get(identity).cloned()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get(&self, identity: &str) -> Result<Option<CredentialRecord>> {
        Ok(self.records.lock().unwrap().get(identity).cloned())
    }

    async fn put(&self, record: &CredentialRecord) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.records
            .lock()
            .unwrap()
            .insert(record.identity.clone(), record.clone());
        Ok(())
    }
}

/// Gateway fake serving canned messages and recording mutations
#[derive(Default)]
pub struct FakeGateway {
    pub message_ids: Vec<String>,
    pub messages: HashMap<String, MailMessage>,
    pub attachments: HashMap<String, Vec<u8>>,
    pub labels_applied: Mutex<Vec<(String, String)>>,
}

impl FakeGateway {
    pub fn labels_applied(&self) -> Vec<(String, String)> {
        self.labels_applied.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailGateway for FakeGateway {
    async fn list_message_ids(&self, _session: &Session) -> Result<Vec<String>> {
        Ok(self.message_ids.clone())
    }

    async fn get_message(&self, _session: &Session, id: &str) -> Result<MailMessage> {
        self.messages
            .get(id)
            .cloned()
            .ok_or_else(|| TriageError::MessageNotFound(id.to_string()))
    }

    async fn get_attachment(
        &self,
        _session: &Session,
        _message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>> {
        self.attachments
            .get(attachment_id)
            .cloned()
            .ok_or_else(|| TriageError::MessageNotFound(attachment_id.to_string()))
    }

    async fn add_label(&self, _session: &Session, message_id: &str, label_id: &str) -> Result<()> {
        self.labels_applied
            .lock()
            .unwrap()
            .push((message_id.to_string(), label_id.to_string()));
        Ok(())
    }

    async fn register_watch(&self, _session: &Session, _topic: &str) -> Result<WatchStatus> {
        Ok(WatchStatus {
            history_id: Some(1),
            expiration: None,
        })
    }
}

/// Classifier fake mapping image URLs to canned annotations
#[derive(Default)]
pub struct FakeClassifier {
    pub annotations: HashMap<String, ImageAnnotation>,
}

impl FakeClassifier {
    pub fn with_labels(url: &str, labels: &[&str]) -> Self {
        let mut classifier = Self::default();
        classifier.annotations.insert(
            url.to_string(),
            ImageAnnotation {
                labels: labels.iter().map(|s| s.to_string()).collect(),
                error: None,
            },
        );
        classifier
    }
}

#[async_trait]
impl LabelClassifier for FakeClassifier {
    async fn annotate(&self, _session: &Session, image: &Image) -> Result<ImageAnnotation> {
        let key = match image {
            Image::Url(url) => url.clone(),
            Image::Bytes(_) => "bytes".to_string(),
        };
        Ok(self.annotations.get(&key).cloned().unwrap_or_default())
    }
}

/// A credential that will not need a refresh
pub fn fresh_record(identity: &str) -> CredentialRecord {
    CredentialRecord {
        identity: identity.to_string(),
        access_token: "ya29.fresh".to_string(),
        refresh_token: "1//refresh".to_string(),
        expiry: Some(Utc::now() + Duration::hours(1)),
    }
}

/// A credential whose expiry is in the past
pub fn expired_record(identity: &str) -> CredentialRecord {
    CredentialRecord {
        expiry: Some(Utc::now() - Duration::minutes(5)),
        ..fresh_record(identity)
    }
}

/// Application secret for constructing OAuth clients in tests
pub fn test_secret() -> AppSecret {
    AppSecret {
        client_id: "test-client-id".to_string(),
        client_secret: "test-secret".to_string(),
        project_id: None,
        redirect_uris: None,
    }
}

/// A message whose HTML body embeds one image URL
pub fn message_with_embedded_image(id: &str, url: &str) -> MailMessage {
    MailMessage {
        id: id.to_string(),
        body_data: None,
        parts: vec![MailPart {
            mime_type: "text/html".to_string(),
            attachment_id: None,
            body_data: Some(format!("<html><img src=\"{}\"></html>", url).into_bytes()),
        }],
    }
}

/// Build a Pub/Sub push envelope for an identity
pub fn push_envelope(identity: &str) -> Vec<u8> {
    let data = STANDARD.encode(format!(
        r#"{{"emailAddress":"{}","historyId":99}}"#,
        identity
    ));
    format!(r#"{{"message":{{"data":"{}","messageId":"m-1"}}}}"#, data).into_bytes()
}
