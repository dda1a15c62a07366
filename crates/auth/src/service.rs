use agentdesk_core::{paths, CredentialPair, Route};
use agentdesk_http::{ApiClient, ApiError, RequestOptions};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Api(#[from] ApiError),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Response did not contain an access token")]
    MissingTokens,
    #[error("No refresh token available")]
    NoRefreshToken,
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),
}

impl AuthError {
    /// Short human-readable message, the server's own wording when it sent one.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::Api(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Sign-in, registration, token refresh and logout.
pub struct AuthService {
    api: Arc<ApiClient>,
    refresh_lock: Mutex<()>,
}

impl AuthService {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self {
            api,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    /// Exchange credentials for a token pair and store it. Nothing is written on
    /// failure and no redirect happens; the error carries the server's message.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<CredentialPair, AuthError> {
        let email = normalize_email(email)?;
        if password.is_empty() {
            return Err(AuthError::InvalidInput("password must not be empty".into()));
        }

        let response = self
            .api
            .post(
                paths::SIGN_IN,
                &json!({ "email": email, "password": password }),
                RequestOptions::public().suppress_redirect(),
            )
            .await?;

        let pair = CredentialPair::from_token_response(&response.data).ok_or(AuthError::MissingTokens)?;
        self.api.tokens().set_pair(&pair);
        info!("Signed in as {}", email);
        Ok(pair)
    }

    /// Create an account. Tokens are stored when the backend returns them with
    /// the new account.
    pub async fn register(
        &self,
        request: &RegistrationRequest,
    ) -> Result<Option<CredentialPair>, AuthError> {
        let mut request = request.clone();
        request.email = normalize_email(&request.email)?;
        if request.password.is_empty() {
            return Err(AuthError::InvalidInput("password must not be empty".into()));
        }

        let response = self
            .api
            .post(
                paths::REGISTER,
                &request,
                RequestOptions::public().suppress_redirect(),
            )
            .await?;

        let pair = CredentialPair::from_token_response(&response.data);
        if let Some(pair) = &pair {
            self.api.tokens().set_pair(pair);
        }
        info!("Registered {} (signed in: {})", request.email, pair.is_some());
        Ok(pair)
    }

    /// Rotate the token pair.
    ///
    /// Single-flight: callers queue on one lock, and a caller that finds the
    /// store changed while it waited takes the new pair instead of calling the
    /// server again. Failure is terminal for the session and redirects once;
    /// callers queued behind a failed refresh get an error without redirecting.
    pub async fn refresh(&self) -> Result<CredentialPair, AuthError> {
        let tokens = self.api.tokens();
        let observed = tokens.revision();

        let _guard = self.refresh_lock.lock().await;

        let changed = tokens.revision() != observed;
        if changed {
            if let Some(current) = tokens.credentials() {
                return Ok(current);
            }
        }

        let Some(refresh_token) = tokens.refresh_token() else {
            // Whoever emptied the store while we waited already redirected
            if changed {
                return Err(AuthError::RefreshFailed("session ended while waiting".into()));
            }
            self.api.force_sign_in("no refresh token");
            return Err(AuthError::NoRefreshToken);
        };

        let result = self
            .api
            .post(
                paths::TOKEN_REFRESH,
                &json!({ "refresh": refresh_token }),
                RequestOptions::public().suppress_redirect(),
            )
            .await;

        let pair = match result {
            Ok(response) => match response.data.get("access").and_then(|v| v.as_str()) {
                Some(access) if !access.is_empty() => {
                    // Servers that do not rotate refresh tokens omit it
                    let refresh = response
                        .data
                        .get("refresh")
                        .and_then(|v| v.as_str())
                        .filter(|r| !r.is_empty())
                        .unwrap_or(&refresh_token);
                    CredentialPair::new(access, Some(refresh.to_string()))
                }
                _ => {
                    self.api.force_sign_in("refresh response without access token");
                    return Err(AuthError::RefreshFailed("missing access token".into()));
                }
            },
            Err(e) => {
                self.api.force_sign_in("token refresh rejected");
                return Err(AuthError::RefreshFailed(e.to_string()));
            }
        };

        tokens.set_pair(&pair);
        info!("Access token refreshed");
        Ok(pair)
    }

    /// Best-effort server logout followed by an unconditional local one.
    pub async fn logout(&self) {
        let tokens = self.api.tokens();

        if let Some(refresh_token) = tokens.refresh_token() {
            let result = self
                .api
                .post(
                    paths::LOGOUT,
                    &json!({ "refresh": refresh_token }),
                    RequestOptions::default().suppress_redirect(),
                )
                .await;
            if let Err(e) = result {
                warn!("Server logout failed, clearing local session anyway: {}", e);
            }
        }

        tokens.clear_tokens();
        self.api.navigator().navigate(Route::SignIn);
        info!("Signed out");
    }
}

fn normalize_email(raw: &str) -> Result<String, AuthError> {
    let normalized = raw.trim().to_lowercase();
    if normalized.is_empty() {
        return Err(AuthError::InvalidInput("email must not be empty".into()));
    }
    if !normalized.contains('@') {
        return Err(AuthError::InvalidInput(format!("'{}' is not an email address", normalized)));
    }
    Ok(normalized)
}
