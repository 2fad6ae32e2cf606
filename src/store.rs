//! Credential persistence: one record per identity

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, TriageError};

/// Persisted token material for one identity
///
/// Created on first successful authorization, overwritten on every refresh,
/// never deleted (there is no revocation flow).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CredentialRecord {
    /// Mailbox owner's address, the lookup key
    pub identity: String,
    pub access_token: String,
    pub refresh_token: String,
    /// Access token expiry; a missing expiry marks the record stale
    pub expiry: Option<DateTime<Utc>>,
}

/// Narrow storage seam so session resolution is testable with fakes
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, identity: &str) -> Result<Option<CredentialRecord>>;
    async fn put(&self, record: &CredentialRecord) -> Result<()>;
}

#[async_trait]
impl<T: CredentialStore + ?Sized> CredentialStore for std::sync::Arc<T> {
    async fn get(&self, identity: &str) -> Result<Option<CredentialRecord>> {
        (**self).get(identity).await
    }

    async fn put(&self, record: &CredentialRecord) -> Result<()> {
        (**self).put(record).await
    }
}

/// File-backed store: one pretty-printed JSON document per identity
///
/// The get-then-put sequence during a refresh is not atomic; concurrent
/// refreshes for the same identity race and the last write wins.
pub struct FileCredentialStore {
    dir: PathBuf,
}

impl FileCredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn record_path(&self, identity: &str) -> PathBuf {
        // Identities are email addresses; keep the filename flat
        let name: String = identity
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn get(&self, identity: &str) -> Result<Option<CredentialRecord>> {
        let path = self.record_path(identity);
        if !path.exists() {
            return Ok(None);
        }

        let json = tokio::fs::read_to_string(&path).await?;
        let record: CredentialRecord = serde_json::from_str(&json)
            .map_err(|e| TriageError::StoreError(format!("corrupt record at {:?}: {}", path, e)))?;

        Ok(Some(record))
    }

    async fn put(&self, record: &CredentialRecord) -> Result<()> {
        let path = self.record_path(&record.identity);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(record)?;
        tokio::fs::write(&path, json).await?;
        secure_record_file(&path).await?;
        tracing::debug!("Stored credential record for {} at {:?}", record.identity, path);
        Ok(())
    }
}

/// Secure a credential file on Unix (0600, owner-only); records hold refresh
/// tokens and must not be readable by other users
#[cfg(unix)]
pub async fn secure_record_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

/// Secure a credential file on Windows (stub)
///
/// Windows uses ACLs instead of Unix permissions; in production, use win32
/// APIs to set appropriate ACLs
#[cfg(windows)]
pub async fn secure_record_file(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_record() -> CredentialRecord {
        CredentialRecord {
            identity: "user@example.com".to_string(),
            access_token: "ya29.stub".to_string(),
            refresh_token: "1//refresh".to_string(),
            expiry: Some(Utc::now()),
        }
    }

    #[tokio::test]
    async fn test_get_missing_record_returns_none() {
        let dir = tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path());

        let record = store.get("nobody@example.com").await.unwrap();
        assert!(record.is_none());
    }

    #[tokio::test]
    async fn test_put_then_get_round_trip() {
        let dir = tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path());
        let record = sample_record();

        store.put(&record).await.unwrap();
        let loaded = store.get("user@example.com").await.unwrap().unwrap();

        assert_eq!(loaded.identity, record.identity);
        assert_eq!(loaded.access_token, record.access_token);
        assert_eq!(loaded.refresh_token, record.refresh_token);
    }

    #[tokio::test]
    async fn test_put_overwrites_existing_record() {
        let dir = tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path());

        let mut record = sample_record();
        store.put(&record).await.unwrap();

        record.access_token = "ya29.rotated".to_string();
        store.put(&record).await.unwrap();

        let loaded = store.get("user@example.com").await.unwrap().unwrap();
        assert_eq!(loaded.access_token, "ya29.rotated");
    }

    #[tokio::test]
    async fn test_put_restricts_record_permissions() {
        let dir = tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path());
        let record = sample_record();

        store.put(&record).await.unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let path = store.record_path("user@example.com");
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[tokio::test]
    async fn test_record_path_flattens_separators() {
        let dir = tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path());

        let mut record = sample_record();
        record.identity = "weird/../name@example.com".to_string();
        store.put(&record).await.unwrap();

        // Nothing escapes the store directory
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
