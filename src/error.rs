use thiserror::Error;

/// Type alias for Result with TriageError
pub type Result<T> = std::result::Result<T, TriageError>;

/// Error types for the mail triage service
///
/// Label mismatch is deliberately NOT represented here: a message whose
/// images carry no matching label is a clean skip, reported through
/// [`crate::pipeline::Outcome::Skipped`] rather than an error.
#[derive(Error, Debug)]
pub enum TriageError {
    /// No credential on record for this identity; the caller should send
    /// the user back through the authorization flow
    #[error("no credential on record for {0}")]
    UnknownIdentity(String),

    /// Missing or malformed input at the HTTP boundary
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Token exchange, refresh or userinfo failure
    #[error("authorization failed: {0}")]
    AuthError(String),

    /// Mail provider returned an error
    #[error("mail API error: {0}")]
    ApiError(String),

    /// Network-related error (connection issues, TLS, etc.)
    #[error("network error: {0}")]
    NetworkError(String),

    /// Resource not found (404)
    #[error("message not found: {0}")]
    MessageNotFound(String),

    /// Bad request rejected by the provider (400)
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Access forbidden (403)
    #[error("access forbidden: {0}")]
    Forbidden(String),

    /// Provider returned a message the pipeline cannot work with
    #[error("invalid message format: {0}")]
    InvalidMessageFormat(String),

    /// Image labeling service failure
    #[error("classification error: {0}")]
    ClassificationError(String),

    /// Credential store failure
    #[error("store error: {0}")]
    StoreError(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl TriageError {
    /// Whether this error means the user has never authorized (or lost)
    /// their credential and should restart the consent flow
    pub fn is_unknown_identity(&self) -> bool {
        matches!(self, TriageError::UnknownIdentity(_))
    }
}

impl From<google_gmail1::Error> for TriageError {
    fn from(error: google_gmail1::Error) -> Self {
        match error {
            // HTTP response with status code (non-success responses)
            google_gmail1::Error::Failure(ref response) => {
                let status = response.status();
                let status_code = status.as_u16();
                let message = format!(
                    "HTTP {}: {}",
                    status_code,
                    status.canonical_reason().unwrap_or("Unknown")
                );

                match status_code {
                    401 => TriageError::AuthError(message),
                    403 => TriageError::Forbidden(message),
                    404 => TriageError::MessageNotFound("resource not found".to_string()),
                    400 => TriageError::BadRequest(message),
                    // No retry policy: 429 and 5xx abandon the run like any other failure
                    _ => TriageError::ApiError(message),
                }
            }
            // Request not understood by the server
            google_gmail1::Error::BadRequest(ref err) => {
                TriageError::BadRequest(format!("{}", err))
            }
            // Network/connection errors
            google_gmail1::Error::HttpError(ref err) => {
                TriageError::NetworkError(format!("connection error: {}", err))
            }
            google_gmail1::Error::Io(err) => TriageError::NetworkError(err.to_string()),
            // All other errors
            _ => TriageError::ApiError(error.to_string()),
        }
    }
}

impl From<reqwest::Error> for TriageError {
    fn from(error: reqwest::Error) -> Self {
        TriageError::NetworkError(error.to_string())
    }
}
