use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{read_json, UpstreamClient, UpstreamError, USER_KEY};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub full_name: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub full_name: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    user: UserProfile,
}

#[derive(Debug, Deserialize)]
struct Claims {
    exp: Option<f64>,
}

impl UpstreamClient {
    pub async fn sign_up(&self, request: &SignUpRequest) -> Result<UserProfile, UpstreamError> {
        let response = self.http.post(self.url("/auth/signup")).json(request).send().await?;
        let token: TokenResponse = read_json(response, "Sign up failed").await?;
        self.store_credentials(&token.access_token, &token.user).await?;
        info!("Signed up {}", token.user.email);
        Ok(token.user)
    }

    pub async fn sign_in(&self, request: &SignInRequest) -> Result<UserProfile, UpstreamError> {
        let response = self.http.post(self.url("/auth/signin")).json(request).send().await?;
        let token: TokenResponse = read_json(response, "Sign in failed").await?;
        self.store_credentials(&token.access_token, &token.user).await?;
        info!("Signed in {}", token.user.email);
        Ok(token.user)
    }

    /// Best-effort logout upstream; local credentials are always cleared.
    pub async fn sign_out(&self) {
        match self.token().await {
            Ok(Some(token)) => {
                let result = self
                    .http
                    .post(self.url("/auth/logout"))
                    .bearer_auth(token)
                    .send()
                    .await;
                if let Err(e) = result {
                    warn!("Logout request failed: {e}");
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Could not read stored token: {e}"),
        }
        self.clear_credentials().await;
    }

    /// Fetches the signed-in user and refreshes the stored copy.
    pub async fn current_user(&self) -> Result<UserProfile, UpstreamError> {
        let request = self.http.get(self.url("/auth/me"));
        let response = self.send_authenticated(request).await?;
        let user: UserProfile = read_json(response, "Failed to fetch user data").await?;
        self.store
            .set(&self.key(USER_KEY), &serde_json::to_string(&user)?)
            .await?;
        Ok(user)
    }

    /// The user saved at sign-in, if any.
    pub async fn stored_user(&self) -> Option<UserProfile> {
        let raw = self.store.get(&self.key(USER_KEY)).await.ok()??;
        serde_json::from_str(&raw).ok()
    }

    /// True when a token is stored and its `exp` claim is in the future.
    /// The signature is not verified.
    pub async fn is_authenticated(&self) -> bool {
        match self.token().await {
            Ok(Some(token)) => token_is_fresh(&token, Utc::now().timestamp() as f64),
            _ => false,
        }
    }
}

fn token_is_fresh(token: &str, now_secs: f64) -> bool {
    let Some(payload) = token.split('.').nth(1) else {
        return false;
    };
    let payload = payload.trim_end_matches('=');
    let Ok(bytes) = URL_SAFE_NO_PAD
        .decode(payload)
        .or_else(|_| STANDARD_NO_PAD.decode(payload))
    else {
        return false;
    };
    match serde_json::from_slice::<Claims>(&bytes) {
        Ok(Claims { exp: Some(exp) }) => exp > now_secs,
        _ => false,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
