//! Session resolution: credential lookup, freshness check, refresh-and-persist

use chrono::{Duration, Utc};
use tracing::{debug, info};

use crate::auth::OAuthClient;
use crate::error::{Result, TriageError};
use crate::store::{CredentialRecord, CredentialStore};

/// A credential expiring within this many seconds of now counts as stale
pub const REFRESH_MARGIN_SECS: i64 = 60;

/// Resolved authorization material for one pipeline run
///
/// An explicit per-call value threaded through every provider call. There is
/// no shared session context to overwrite, so concurrent runs for different
/// identities cannot interfere with each other.
#[derive(Debug, Clone)]
pub struct Session {
    identity: String,
    access_token: String,
}

impl Session {
    pub fn new(identity: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            access_token: access_token.into(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }
}

/// Fetches, validates and refreshes credentials against the store
#[derive(Clone)]
pub struct SessionManager<S> {
    store: S,
    oauth: OAuthClient,
}

impl<S: CredentialStore> SessionManager<S> {
    pub fn new(store: S, oauth: OAuthClient) -> Self {
        Self { store, oauth }
    }

    /// Resolve a usable session for `identity`
    ///
    /// Fails with [`TriageError::UnknownIdentity`] when no credential is on
    /// record; callers use that to redirect the user into a fresh
    /// authorization flow. A stale credential (no expiry, or expiry within
    /// [`REFRESH_MARGIN_SECS`] of now) triggers exactly one refresh, and the
    /// updated record is persisted before the session is returned.
    pub async fn resolve(&self, identity: &str) -> Result<Session> {
        let record = self
            .store
            .get(identity)
            .await?
            .ok_or_else(|| TriageError::UnknownIdentity(identity.to_string()))?;

        if is_stale(&record) {
            return self.refresh_and_persist(record).await;
        }

        debug!("Credential for {} is fresh, adopting directly", identity);
        Ok(Session::new(record.identity, record.access_token))
    }

    async fn refresh_and_persist(&self, record: CredentialRecord) -> Result<Session> {
        debug!("Credential for {} is stale, refreshing", record.identity);

        let token = self.oauth.refresh_access_token(&record.refresh_token).await?;

        let updated = CredentialRecord {
            identity: record.identity,
            access_token: token.access_token,
            // Refresh responses usually omit the refresh token; keep the old one
            refresh_token: token.refresh_token.unwrap_or(record.refresh_token),
            expiry: token.expires_in.map(|secs| Utc::now() + Duration::seconds(secs)),
        };
        self.store.put(&updated).await?;

        info!("Refreshed credential for {}", updated.identity);
        Ok(Session::new(updated.identity, updated.access_token))
    }
}

/// Whether a record needs a refresh before use
fn is_stale(record: &CredentialRecord) -> bool {
    match record.expiry {
        None => true,
        Some(expiry) => expiry <= Utc::now() + Duration::seconds(REFRESH_MARGIN_SECS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with_expiry(expiry: Option<chrono::DateTime<Utc>>) -> CredentialRecord {
        CredentialRecord {
            identity: "user@example.com".to_string(),
            access_token: "tok".to_string(),
            refresh_token: "refresh".to_string(),
            expiry,
        }
    }

    #[test]
    fn test_missing_expiry_is_stale() {
        assert!(is_stale(&record_with_expiry(None)));
    }

    #[test]
    fn test_past_expiry_is_stale() {
        let expiry = Utc::now() - Duration::seconds(10);
        assert!(is_stale(&record_with_expiry(Some(expiry))));
    }

    #[test]
    fn test_expiry_inside_margin_is_stale() {
        let expiry = Utc::now() + Duration::seconds(30);
        assert!(is_stale(&record_with_expiry(Some(expiry))));
    }

    #[test]
    fn test_expiry_beyond_margin_is_fresh() {
        let expiry = Utc::now() + Duration::seconds(300);
        assert!(!is_stale(&record_with_expiry(Some(expiry))));
    }
}
