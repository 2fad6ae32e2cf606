//! HTTP boundary: authorization endpoints, watch registration, push handler

use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, LOCATION};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use url::form_urlencoded;

use crate::auth::OAuthClient;
use crate::classify::VisionClassifier;
use crate::config::Config;
use crate::error::{Result, TriageError};
use crate::gateway::{GmailGateway, MailGateway, WatchStatus};
use crate::pipeline::{Outcome, Pipeline};
use crate::session::SessionManager;
use crate::store::{CredentialRecord, CredentialStore, FileCredentialStore};

type AppPipeline = Pipeline<Arc<FileCredentialStore>, Arc<GmailGateway>, VisionClassifier>;

/// Shared state behind all endpoints
pub struct App {
    config: Config,
    oauth: OAuthClient,
    store: Arc<FileCredentialStore>,
    gateway: Arc<GmailGateway>,
    sessions: SessionManager<Arc<FileCredentialStore>>,
    pipeline: AppPipeline,
}

impl App {
    pub fn new(config: Config, oauth: OAuthClient) -> Result<Self> {
        let store = Arc::new(FileCredentialStore::new(config.auth.store_dir.clone()));
        let gateway = Arc::new(GmailGateway::new()?);
        let sessions = SessionManager::new(Arc::clone(&store), oauth.clone());
        let pipeline = Pipeline::new(
            sessions.clone(),
            Arc::clone(&gateway),
            VisionClassifier::new(),
            &config.triage,
        );

        Ok(Self {
            config,
            oauth,
            store,
            gateway,
            sessions,
            pipeline,
        })
    }

    fn base_url(&self) -> &str {
        self.config.server.base_url.trim_end_matches('/')
    }

    fn redirect_uri(&self) -> String {
        format!("{}/auth/callback", self.base_url())
    }

    /// Dispatch one request
    pub async fn route(&self, req: Request<Incoming>) -> Response<Full<Bytes>> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let query = req.uri().query().map(str::to_string);

        match (method, path.as_str()) {
            (Method::GET, "/auth/login") => self.login(),
            (Method::GET, "/auth/callback") => self.callback(query.as_deref()).await,
            (Method::GET, "/watch") => self.watch(query.as_deref()).await,
            (Method::POST, "/notify") => match req.into_body().collect().await {
                Ok(collected) => self.notify(&collected.to_bytes()).await,
                Err(e) => {
                    warn!("Failed to read notification body: {}", e);
                    text(StatusCode::BAD_REQUEST, "failed to read request body")
                }
            },
            _ => text(StatusCode::NOT_FOUND, "not found"),
        }
    }

    /// GET /auth/login: send the user to the provider consent screen
    fn login(&self) -> Response<Full<Bytes>> {
        match self.oauth.authorize_url(&self.redirect_uri()) {
            Ok(url) => redirect(url.as_str()),
            Err(e) => {
                error!("Failed to build authorize URL: {}", e);
                text(StatusCode::INTERNAL_SERVER_ERROR, "authorization unavailable")
            }
        }
    }

    /// GET /auth/callback?code=: exchange the code, persist the credential,
    /// then bounce to watch initialization with the identity escaped
    async fn callback(&self, query: Option<&str>) -> Response<Full<Bytes>> {
        let Some(code) = query_param(query, "code") else {
            return text(StatusCode::BAD_REQUEST, "missing code parameter");
        };

        match self.complete_authorization(&code).await {
            Ok(identity) => {
                let escaped: String = form_urlencoded::byte_serialize(identity.as_bytes()).collect();
                redirect(&format!("{}/watch?identity={}", self.base_url(), escaped))
            }
            Err(e) => {
                error!("Authorization callback failed: {}", e);
                text(StatusCode::INTERNAL_SERVER_ERROR, "authorization failed")
            }
        }
    }

    async fn complete_authorization(&self, code: &str) -> Result<String> {
        let token = self.oauth.exchange_code(code, &self.redirect_uri()).await?;
        let identity = self.oauth.fetch_identity(&token.access_token).await?;

        // prompt=consent means a refresh token is always reissued here
        let refresh_token = token.refresh_token.clone().ok_or_else(|| {
            TriageError::AuthError("token response carried no refresh token".to_string())
        })?;
        let record = CredentialRecord {
            identity: identity.clone(),
            access_token: token.access_token,
            refresh_token,
            expiry: token.expires_in.map(|secs| chrono::Utc::now() + chrono::Duration::seconds(secs)),
        };
        self.store.put(&record).await?;

        info!("Stored credential for {}", identity);
        Ok(identity)
    }

    /// GET /watch?identity=: register the provider-side push subscription
    async fn watch(&self, query: Option<&str>) -> Response<Full<Bytes>> {
        let Some(identity) = query_param(query, "identity") else {
            return text(StatusCode::BAD_REQUEST, "missing identity parameter");
        };
        if !identity.contains('@') {
            return text(StatusCode::BAD_REQUEST, "invalid identity parameter");
        }

        match self.init_watch(&identity).await {
            Ok(status) => {
                info!(
                    "Watch registered for {} (history id {:?}, expires {:?})",
                    identity, status.history_id, status.expiration
                );
                text(StatusCode::OK, "watch registered")
            }
            Err(e) if e.is_unknown_identity() => {
                // Not an operational error: the user just needs to authorize
                redirect(&format!("{}/auth/login", self.base_url()))
            }
            Err(e) => {
                error!("Watch registration for {} failed: {}", identity, e);
                text(StatusCode::INTERNAL_SERVER_ERROR, "watch registration failed")
            }
        }
    }

    async fn init_watch(&self, identity: &str) -> Result<WatchStatus> {
        if self.config.watch.topic.is_empty() {
            return Err(TriageError::ConfigError(
                "watch.topic is not configured".to_string(),
            ));
        }
        let session = self.sessions.resolve(identity).await?;
        self.gateway
            .register_watch(&session, &self.config.watch.topic)
            .await
    }

    /// POST /notify: one pipeline run per push delivery
    ///
    /// Provider failures are logged and the run abandoned; this path does not
    /// surface 500s back to the push infrastructure.
    async fn notify(&self, body: &[u8]) -> Response<Full<Bytes>> {
        match self.pipeline.handle_notification(body).await {
            Ok(Outcome::Mutated) => text(StatusCode::OK, "mutated"),
            Ok(Outcome::Skipped) => text(StatusCode::OK, "skipped"),
            Err(TriageError::InvalidInput(msg)) => {
                warn!("Rejected push notification: {}", msg);
                text(StatusCode::BAD_REQUEST, "invalid notification payload")
            }
            Err(e) => {
                error!("Abandoning triage run: {}", e);
                text(StatusCode::OK, "")
            }
        }
    }
}

/// Accept loop: one task per connection
pub async fn serve(app: App) -> Result<()> {
    let listener = TcpListener::bind(&app.config.server.listen_addr).await?;
    info!(
        "Listening on {} (base URL {})",
        app.config.server.listen_addr, app.config.server.base_url
    );

    let app = Arc::new(app);
    loop {
        let (stream, remote) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let app = Arc::clone(&app);

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let app = Arc::clone(&app);
                async move { Ok::<_, Infallible>(app.route(req).await) }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                warn!("Connection from {} errored: {}", remote, e);
            }
        });
    }
}

fn text(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response
}

fn redirect(location: &str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::FOUND;
    match HeaderValue::from_str(location) {
        Ok(value) => {
            response.headers_mut().insert(LOCATION, value);
        }
        Err(_) => {
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        }
    }
    response
}

fn query_param(query: Option<&str>, key: &str) -> Option<String> {
    let query = query?;
    form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_param() {
        assert_eq!(
            query_param(Some("identity=user%40example.com&x=1"), "identity").as_deref(),
            Some("user@example.com")
        );
        assert_eq!(query_param(Some("a=1&b=2"), "identity"), None);
        assert_eq!(query_param(None, "identity"), None);
    }

    #[test]
    fn test_redirect_sets_location() {
        let response = redirect("http://localhost:8080/auth/login");
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers().get(LOCATION).unwrap(),
            "http://localhost:8080/auth/login"
        );
    }

    #[test]
    fn test_text_response() {
        let response = text(StatusCode::BAD_REQUEST, "missing identity parameter");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
