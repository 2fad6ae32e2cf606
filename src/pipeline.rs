//! The triage pipeline: one run per push notification
//!
//! Start → session resolved → message listed → fetched → images extracted →
//! labeled → starred or skipped. Any step's error abandons the run; a label
//! mismatch is a clean [`Outcome::Skipped`], not an error.

use tracing::{debug, info};

use crate::classify::{classify_images, LabelClassifier};
use crate::config::TriageConfig;
use crate::error::Result;
use crate::extract::extract_images;
use crate::gateway::MailGateway;
use crate::models::PushNotification;
use crate::session::SessionManager;
use crate::store::CredentialStore;

/// Terminal state of one pipeline run; failures are the `Err` arm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The target concept was found and the message was starred
    Mutated,
    /// Nothing to do: no message, no match
    Skipped,
}

/// Orchestrates session resolution and the chain of provider calls
pub struct Pipeline<S, G, C> {
    sessions: SessionManager<S>,
    gateway: G,
    classifier: C,
    target_label: String,
    star_label_id: String,
}

impl<S, G, C> Pipeline<S, G, C>
where
    S: CredentialStore,
    G: MailGateway,
    C: LabelClassifier,
{
    pub fn new(
        sessions: SessionManager<S>,
        gateway: G,
        classifier: C,
        triage: &TriageConfig,
    ) -> Self {
        Self {
            sessions,
            gateway,
            classifier,
            target_label: triage.target_label.clone(),
            star_label_id: triage.star_label_id.clone(),
        }
    }

    /// Decode a push envelope and run the pipeline for its identity
    pub async fn handle_notification(&self, body: &[u8]) -> Result<Outcome> {
        let note = PushNotification::from_envelope(body)?;
        debug!(
            "Push notification for {} (history id {:?})",
            note.email_address, note.history_id
        );
        self.run(&note.email_address).await
    }

    /// Triage the newest message in `identity`'s inbox
    pub async fn run(&self, identity: &str) -> Result<Outcome> {
        let session = self.sessions.resolve(identity).await?;

        let ids = self.gateway.list_message_ids(&session).await?;
        // The provider returns newest first; no pagination, no app-side selection
        let Some(newest) = ids.first() else {
            debug!("No messages listed for {}, nothing to triage", identity);
            return Ok(Outcome::Skipped);
        };

        let message = self.gateway.get_message(&session, newest).await?;
        let images = extract_images(&self.gateway, &session, &message).await?;
        let labels = classify_images(&self.classifier, &session, &images).await?;
        debug!("Message {} labels: {:?}", message.id, labels);

        // Exact, case-sensitive match against the one fixed target string
        if labels.iter().any(|label| label == &self.target_label) {
            self.gateway
                .add_label(&session, &message.id, &self.star_label_id)
                .await?;
            info!(
                "Applied {} to message {} for {} (matched '{}')",
                self.star_label_id, message.id, identity, self.target_label
            );
            return Ok(Outcome::Mutated);
        }

        debug!(
            "Message {} carries no '{}' label, skipping",
            message.id, self.target_label
        );
        Ok(Outcome::Skipped)
    }
}
