//! OAuth2 flows: consent URL, code exchange, token refresh, identity lookup
//!
//! Token lifecycle is owned by [`crate::session::SessionManager`]; this module
//! only talks to the provider's OAuth endpoints.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use url::Url;

use crate::error::{Result, TriageError};

/// Scopes requested on the consent screen
///
/// - gmail.modify: read message bodies/attachments and apply labels
/// - userinfo.email: resolve the authorizing user's address
pub const REQUIRED_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/userinfo.email",
];

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

/// OAuth client credentials JSON in Google's console format
///
/// Web deployments carry a `web` key, desktop credentials an `installed` key;
/// both hold the same fields.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConsoleCredentials {
    #[serde(default)]
    pub web: Option<AppSecret>,
    #[serde(default)]
    pub installed: Option<AppSecret>,
}

/// The application's own client identifier/secret (not a per-user entity)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSecret {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub redirect_uris: Option<Vec<String>>,
}

/// Load the application secret from a local JSON file
pub async fn load_app_secret(path: &Path) -> Result<AppSecret> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| TriageError::ConfigError(format!("Failed to read credentials: {}", e)))?;

    let creds: ConsoleCredentials = serde_json::from_str(&content)
        .map_err(|e| TriageError::ConfigError(format!("Failed to parse credentials: {}", e)))?;

    creds.web.or(creds.installed).ok_or_else(|| {
        TriageError::ConfigError("credentials file has neither 'web' nor 'installed' key".to_string())
    })
}

/// Token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Present on first authorization (and re-consent); refresh responses
    /// usually omit it
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Absolute expiry computed from `expires_in`
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expires_in.map(|secs| Utc::now() + Duration::seconds(secs))
    }
}

/// Client for the provider's OAuth endpoints
#[derive(Clone)]
pub struct OAuthClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    auth_url: String,
    token_url: String,
    userinfo_url: String,
}

impl OAuthClient {
    pub fn new(secret: AppSecret) -> Self {
        Self::with_endpoints(
            secret,
            GOOGLE_AUTH_URL.to_string(),
            GOOGLE_TOKEN_URL.to_string(),
            GOOGLE_USERINFO_URL.to_string(),
        )
    }

    /// Construct against non-default endpoints (used by tests)
    pub fn with_endpoints(
        secret: AppSecret,
        auth_url: String,
        token_url: String,
        userinfo_url: String,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id: secret.client_id,
            client_secret: secret.client_secret,
            auth_url,
            token_url,
            userinfo_url,
        }
    }

    /// Build the consent-screen redirect URL
    ///
    /// Requests offline access and forces re-consent so a refresh token is
    /// always reissued.
    pub fn authorize_url(&self, redirect_uri: &str) -> Result<Url> {
        let mut url = Url::parse(&self.auth_url)
            .map_err(|e| TriageError::ConfigError(format!("invalid auth URL: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &REQUIRED_SCOPES.join(" "))
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");

        Ok(url)
    }

    /// Exchange an authorization code for tokens
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenResponse> {
        let mut params = HashMap::new();
        params.insert("client_id", self.client_id.as_str());
        params.insert("client_secret", self.client_secret.as_str());
        params.insert("code", code);
        params.insert("grant_type", "authorization_code");
        params.insert("redirect_uri", redirect_uri);

        let response = self
            .http
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| TriageError::NetworkError(format!("token request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(TriageError::AuthError(format!(
                "token exchange failed with status {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        response.json::<TokenResponse>().await.map_err(|e| {
            TriageError::AuthError(format!("failed to parse token response: {}", e))
        })
    }

    /// Exchange a stored refresh token for a new access token
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenResponse> {
        let mut params = HashMap::new();
        params.insert("client_id", self.client_id.as_str());
        params.insert("client_secret", self.client_secret.as_str());
        params.insert("refresh_token", refresh_token);
        params.insert("grant_type", "refresh_token");

        let response = self
            .http
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| TriageError::NetworkError(format!("token refresh failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(TriageError::AuthError(format!(
                "token refresh failed with status {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        response.json::<TokenResponse>().await.map_err(|e| {
            TriageError::AuthError(format!("failed to parse refresh response: {}", e))
        })
    }

    /// Resolve the authorizing user's email address
    pub async fn fetch_identity(&self, access_token: &str) -> Result<String> {
        #[derive(Deserialize)]
        struct Userinfo {
            email: String,
        }

        let response = self
            .http
            .get(&self.userinfo_url)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await
            .map_err(|e| TriageError::NetworkError(format!("userinfo request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(TriageError::AuthError(format!(
                "userinfo request failed with status {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        let userinfo: Userinfo = response.json().await.map_err(|e| {
            TriageError::AuthError(format!("failed to parse userinfo response: {}", e))
        })?;

        Ok(userinfo.email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn test_secret() -> AppSecret {
        AppSecret {
            client_id: "test-client-id".to_string(),
            client_secret: "test-secret".to_string(),
            project_id: None,
            redirect_uris: None,
        }
    }

    #[tokio::test]
    async fn test_load_app_secret_web_key() {
        let credentials_json = r#"{
            "web": {
                "client_id": "test-client-id",
                "project_id": "test-project",
                "client_secret": "test-secret",
                "redirect_uris": ["http://localhost:8080/auth/callback"]
            }
        }"#;

        let temp_file = NamedTempFile::new().unwrap();
        tokio::fs::write(temp_file.path(), credentials_json)
            .await
            .unwrap();

        let secret = load_app_secret(temp_file.path()).await.unwrap();
        assert_eq!(secret.client_id, "test-client-id");
        assert_eq!(secret.client_secret, "test-secret");
        assert_eq!(secret.project_id.as_deref(), Some("test-project"));
    }

    #[tokio::test]
    async fn test_load_app_secret_installed_key() {
        let credentials_json = r#"{
            "installed": {
                "client_id": "desktop-id",
                "client_secret": "desktop-secret"
            }
        }"#;

        let temp_file = NamedTempFile::new().unwrap();
        tokio::fs::write(temp_file.path(), credentials_json)
            .await
            .unwrap();

        let secret = load_app_secret(temp_file.path()).await.unwrap();
        assert_eq!(secret.client_id, "desktop-id");
    }

    #[tokio::test]
    async fn test_load_app_secret_rejects_empty_document() {
        let temp_file = NamedTempFile::new().unwrap();
        tokio::fs::write(temp_file.path(), "{}").await.unwrap();

        let err = load_app_secret(temp_file.path()).await.unwrap_err();
        assert!(matches!(err, TriageError::ConfigError(_)));
    }

    #[test]
    fn test_authorize_url_parameters() {
        let client = OAuthClient::new(test_secret());
        let url = client
            .authorize_url("http://localhost:8080/auth/callback")
            .unwrap();

        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs.get("client_id").unwrap(), "test-client-id");
        assert_eq!(pairs.get("response_type").unwrap(), "code");
        assert_eq!(pairs.get("access_type").unwrap(), "offline");
        assert_eq!(pairs.get("prompt").unwrap(), "consent");
        assert!(pairs.get("scope").unwrap().contains("gmail.modify"));
        assert!(pairs.get("scope").unwrap().contains("userinfo.email"));
    }

    #[test]
    fn test_token_response_expiry() {
        let response = TokenResponse {
            access_token: "tok".to_string(),
            expires_in: Some(3600),
            refresh_token: None,
            scope: None,
        };

        let expiry = response.expiry().unwrap();
        let delta = expiry - Utc::now();
        assert!(delta > Duration::seconds(3590) && delta <= Duration::seconds(3600));

        let response = TokenResponse {
            access_token: "tok".to_string(),
            expires_in: None,
            refresh_token: None,
            scope: None,
        };
        assert!(response.expiry().is_none());
    }
}
