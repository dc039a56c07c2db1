/// Upstream Client: the account, job-search and resume-analysis API.
///
/// One `UpstreamClient` per editor session. Credentials live in the shared
/// `KeyValueStore` under `"{session id}:gethired_token"` / `"{session id}:gethired_user"`,
/// so signing in on one session never authenticates another, even one opened with
/// the same profile.
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::store::{KeyValueStore, StoreError};

pub mod auth;
pub mod handlers;
pub mod jobs;

pub use auth::{SignInRequest, SignUpRequest, UserProfile};
pub use jobs::{JobPosting, ResumeFeedback};

pub const TOKEN_KEY: &str = "gethired_token";
pub const USER_KEY: &str = "gethired_user";

const REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("authentication expired, sign in again")]
    Unauthorized,

    #[error("not signed in")]
    NotSignedIn,

    #[error("invalid upload: {0}")]
    InvalidUpload(String),

    #[error("credential storage failed: {0}")]
    Store(#[from] StoreError),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Error bodies the API answers with: `{"detail": ..}` or `{"error": ..}`.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
    error: Option<String>,
}

/// Builds the HTTP client shared by all sessions.
pub fn http_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .expect("Failed to build HTTP client")
}

#[derive(Clone)]
pub struct UpstreamClient {
    http: Client,
    base_url: String,
    store: Arc<dyn KeyValueStore>,
    key_prefix: Option<String>,
}

impl UpstreamClient {
    pub fn new(http: Client, base_url: &str, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            store,
            key_prefix: None,
        }
    }

    /// Prefixes stored credential keys with `scope`.
    pub fn scoped(mut self, scope: impl Into<String>) -> Self {
        self.key_prefix = Some(scope.into());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    fn key(&self, name: &str) -> String {
        match &self.key_prefix {
            Some(prefix) => format!("{prefix}:{name}"),
            None => name.to_string(),
        }
    }

    pub async fn token(&self) -> Result<Option<String>, UpstreamError> {
        Ok(self.store.get(&self.key(TOKEN_KEY)).await?)
    }

    async fn store_credentials(&self, token: &str, user: &UserProfile) -> Result<(), UpstreamError> {
        self.store.set(&self.key(TOKEN_KEY), token).await?;
        self.store
            .set(&self.key(USER_KEY), &serde_json::to_string(user)?)
            .await?;
        Ok(())
    }

    pub async fn clear_credentials(&self) {
        for name in [TOKEN_KEY, USER_KEY] {
            if let Err(e) = self.store.remove(&self.key(name)).await {
                warn!("Failed to clear {name}: {e}");
            }
        }
    }

    /// Sends a request with the stored bearer token. A 401 clears credentials.
    async fn send_authenticated(&self, request: RequestBuilder) -> Result<Response, UpstreamError> {
        let token = self.token().await?.ok_or(UpstreamError::NotSignedIn)?;
        let response = request.bearer_auth(token).send().await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            debug!("Upstream rejected token; clearing credentials");
            self.clear_credentials().await;
            return Err(UpstreamError::Unauthorized);
        }
        Ok(response)
    }
}

/// Deserializes a success body, or maps an error body to `UpstreamError::Api`.
async fn read_json<T: DeserializeOwned>(response: Response, fallback: &str) -> Result<T, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| {
            b.error.or(b.detail.map(|d| match d {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            }))
        })
        .unwrap_or_else(|| fallback.to_string());

    Err(UpstreamError::Api {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::Router;

    /// Serves `router` on an ephemeral local port and returns its base URL.
    pub async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    /// An unsigned JWT whose payload is `{"exp": exp}`.
    pub fn jwt_with_exp(exp: i64) -> String {
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        use base64::Engine;

        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"u1","exp":{exp}}}"#));
        format!("{header}.{payload}.sig")
    }
}
