//! Gmail Image Triage
//!
//! A small service that watches a mailbox for new messages, pulls the images
//! out of the newest one, labels them with a vision service, and stars the
//! message when a target concept shows up.
//!
//! # Overview
//!
//! - **Authorization**: explicit OAuth2 token lifecycle (consent URL, code
//!   exchange, refresh against the token endpoint) with one persisted
//!   credential record per identity
//! - **Sessions**: per-call session values resolved from the credential
//!   store, refreshed when stale
//! - **Triage pipeline**: list → fetch → extract images → classify → star on
//!   match, with error short-circuiting and no retries
//! - **HTTP boundary**: consent redirect, OAuth callback, watch registration
//!   and the Pub/Sub push handler
//!
//! # Example Usage
//!
//! ```no_run
//! use std::path::Path;
//! use gmail_triage::{auth, config::Config, server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(Path::new("config.toml")).await?;
//!     let secret = auth::load_app_secret(Path::new(&config.auth.credentials_path)).await?;
//!     let oauth = auth::OAuthClient::new(secret);
//!
//!     let app = server::App::new(config, oauth)?;
//!     server::serve(app).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - OAuth2 flows against the provider's endpoints
//! - [`classify`] - image labeling and label flattening
//! - [`config`] - configuration management
//! - [`error`] - error types and result alias
//! - [`extract`] - inline-attachment and embedded-image extraction
//! - [`gateway`] - stateless Gmail API wrapper
//! - [`models`] - core data structures
//! - [`pipeline`] - the per-notification triage pipeline
//! - [`server`] - HTTP endpoints
//! - [`session`] - session resolution and token refresh
//! - [`store`] - credential record persistence

pub mod auth;
pub mod classify;
pub mod config;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod models;
pub mod pipeline;
pub mod server;
pub mod session;
pub mod store;

// Re-export commonly used types for convenience
pub use error::{Result, TriageError};

// Core data models
pub use models::{Image, MailMessage, MailPart, PushNotification};

// Credential store
pub use store::{CredentialRecord, CredentialStore, FileCredentialStore};

// Session management
pub use session::{Session, SessionManager, REFRESH_MARGIN_SECS};

// Provider seams
pub use classify::{ImageAnnotation, LabelClassifier, VisionClassifier};
pub use gateway::{GmailGateway, MailGateway, WatchStatus};

// Pipeline
pub use pipeline::{Outcome, Pipeline};

// Config types
pub use config::{AuthConfig, Config, ServerConfig, TriageConfig, WatchConfig};
