use agentdesk_core::{Navigator, Route};
use agentdesk_credentials::{TokenRevision, TokenStore};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::transport::*;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Do not attach the bearer token.
    pub no_token: bool,
    /// Hand 401/403 back to the caller without clearing credentials or redirecting.
    pub suppress_auth_redirect: bool,
}

impl RequestOptions {
    /// Options for public endpoints (sign-in, sign-up, plan catalog).
    pub fn public() -> Self {
        Self {
            no_token: true,
            suppress_auth_redirect: false,
        }
    }

    pub fn suppress_redirect(mut self) -> Self {
        self.suppress_auth_redirect = true;
        self
    }
}

/// Successful (2xx) response. An empty body decodes to `Value::Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub data: Value,
}

impl ApiResponse {
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        serde_json::from_value(self.data).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

/// Token-bearing API client shared by every service.
///
/// The bearer token is read from the store on each call. A 401/403 on a
/// protected request clears all credentials and navigates to sign-in, unless
/// the caller suppressed it. Only the first failure observed for a given token
/// (or, when no token could be attached, for a given store revision) acts;
/// later failures against already cleared credentials are ignored.
pub struct ApiClient {
    base_url: String,
    transport: Arc<dyn HttpTransport>,
    tokens: Arc<TokenStore>,
    navigator: Arc<dyn Navigator>,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        transport: Arc<dyn HttpTransport>,
        tokens: Arc<TokenStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ApiError> {
        Ok(Self {
            base_url: normalize_base_url(base_url)?,
            transport,
            tokens,
            navigator,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    pub fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.navigator
    }

    pub fn url_for(&self, path: &str) -> Result<String, ApiError> {
        let trimmed = path.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            return Err(ApiError::InvalidPath(trimmed.to_string()));
        }
        Ok(format!("{}/{}", self.base_url, trimmed.trim_start_matches('/')))
    }

    pub async fn get(&self, path: &str, opts: RequestOptions) -> Result<ApiResponse, ApiError> {
        self.execute(Method::Get, path, RequestBody::Empty, opts).await
    }

    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        opts: RequestOptions,
    ) -> Result<ApiResponse, ApiError> {
        let body = to_json(body)?;
        self.execute(Method::Post, path, RequestBody::Json(body), opts).await
    }

    pub async fn patch<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        opts: RequestOptions,
    ) -> Result<ApiResponse, ApiError> {
        let body = to_json(body)?;
        self.execute(Method::Patch, path, RequestBody::Json(body), opts).await
    }

    pub async fn patch_multipart(
        &self,
        path: &str,
        form: MultipartForm,
        opts: RequestOptions,
    ) -> Result<ApiResponse, ApiError> {
        self.execute(Method::Patch, path, RequestBody::Multipart(form), opts)
            .await
    }

    pub async fn delete(&self, path: &str, opts: RequestOptions) -> Result<ApiResponse, ApiError> {
        self.execute(Method::Delete, path, RequestBody::Empty, opts).await
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        opts: RequestOptions,
    ) -> Result<T, ApiError> {
        self.get(path, opts).await?.decode()
    }

    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        opts: RequestOptions,
    ) -> Result<T, ApiError> {
        self.post(path, body, opts).await?.decode()
    }

    pub async fn patch_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        opts: RequestOptions,
    ) -> Result<T, ApiError> {
        self.patch(path, body, opts).await?.decode()
    }

    /// Drop every credential and navigate to sign-in.
    pub fn force_sign_in(&self, reason: &str) {
        warn!("Session invalidated: {}", reason);
        self.tokens.clear_tokens();
        self.navigator.navigate(Route::SignIn);
    }

    fn reject_token(&self, token: &str, reason: &str) {
        if !self.tokens.clear_if_access_token(token) {
            debug!("Token already replaced or cleared, skipping redirect ({})", reason);
            return;
        }
        warn!("Session invalidated: {}", reason);
        self.navigator.navigate(Route::SignIn);
    }

    // A protected request went out without a token (never signed in, or the
    // access token expired); act only if nothing has touched the store since.
    fn reject_revision(&self, revision: TokenRevision, reason: &str) {
        if !self.tokens.clear_if_revision(revision) {
            debug!("Credentials changed during request, skipping redirect ({})", reason);
            return;
        }
        warn!("Session invalidated: {}", reason);
        self.navigator.navigate(Route::SignIn);
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
        opts: RequestOptions,
    ) -> Result<ApiResponse, ApiError> {
        let url = self.url_for(path)?;

        let bearer = if opts.no_token {
            None
        } else {
            self.tokens.access_token()
        };
        let sent_token = bearer.clone();
        let revision = self.tokens.revision();

        debug!("{} {} (token: {})", method, path, sent_token.is_some());

        let response = self
            .transport
            .send(HttpRequest {
                method,
                url,
                bearer,
                body,
            })
            .await
            .map_err(|e| {
                warn!("{} {} failed: {}", method, path, e);
                ApiError::Transport(e.0)
            })?;

        let status = response.status;
        debug!("{} {} -> {}", method, path, status);

        if response.is_success() {
            return Ok(ApiResponse {
                status,
                data: parse_body(&response.body),
            });
        }

        if status == 401 || status == 403 {
            if !opts.no_token && !opts.suppress_auth_redirect {
                let reason = format!("{} {} returned {}", method, path, status);
                match sent_token {
                    Some(token) => self.reject_token(&token, &reason),
                    None => self.reject_revision(revision, &reason),
                }
            }
            return Err(ApiError::Unauthorized {
                status,
                body: parse_body(&response.body),
            });
        }

        warn!("{} {} rejected with {}", method, path, status);
        match serde_json::from_slice::<Value>(&response.body) {
            Ok(errors) => Err(ApiError::Validation { status, errors }),
            Err(_) => Err(ApiError::Status {
                status,
                body: String::from_utf8_lossy(&response.body).into_owned(),
            }),
        }
    }
}

fn to_json<B: Serialize + ?Sized>(body: &B) -> Result<Value, ApiError> {
    serde_json::to_value(body).map_err(|e| ApiError::Decode(e.to_string()))
}

fn parse_body(body: &[u8]) -> Value {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Value::Null;
    }
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

pub fn normalize_base_url(raw: &str) -> Result<String, ApiError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let Some((scheme, remainder)) = trimmed.split_once("://") else {
        return Err(ApiError::InvalidBaseUrl(raw.to_string()));
    };
    if !(scheme == "http" || scheme == "https") || remainder.is_empty() || remainder.starts_with('/') {
        return Err(ApiError::InvalidBaseUrl(raw.to_string()));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockTransport, RecordingNavigator};
    use serde_json::json;

    fn client(mock: &Arc<MockTransport>, nav: &Arc<RecordingNavigator>) -> ApiClient {
        let tokens = Arc::new(TokenStore::in_memory());
        ApiClient::new("https://api.example.com/", mock.clone(), tokens, nav.clone()).unwrap()
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url(" https://api.example.com/ ").unwrap(),
            "https://api.example.com"
        );
        assert!(normalize_base_url("api.example.com").is_err());
        assert!(normalize_base_url("ftp://api.example.com").is_err());
        assert!(normalize_base_url("https:///x").is_err());
    }

    #[test]
    fn test_url_for_joins_once() {
        let mock = Arc::new(MockTransport::new());
        let nav = Arc::new(RecordingNavigator::default());
        let api = client(&mock, &nav);
        assert_eq!(
            api.url_for("/api/user/profile/").unwrap(),
            "https://api.example.com/api/user/profile/"
        );
        assert!(matches!(
            api.url_for("https://evil.example.com/x"),
            Err(ApiError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn test_bearer_read_at_call_time() {
        let mock = Arc::new(MockTransport::new());
        mock.always(Method::Get, "api/user/profile/", 200, json!({"id": 1}));
        let nav = Arc::new(RecordingNavigator::default());
        let api = client(&mock, &nav);

        api.get("api/user/profile/", RequestOptions::default()).await.unwrap();
        api.tokens().set_tokens("tok-1", None);
        api.get("api/user/profile/", RequestOptions::default()).await.unwrap();
        api.tokens().set_tokens("tok-2", None);
        api.get("api/user/profile/", RequestOptions::default()).await.unwrap();
        api.get("api/user/profile/", RequestOptions::public()).await.unwrap();

        let bearers: Vec<Option<String>> = mock.requests().into_iter().map(|r| r.bearer).collect();
        assert_eq!(
            bearers,
            vec![None, Some("tok-1".into()), Some("tok-2".into()), None]
        );
    }

    #[tokio::test]
    async fn test_validation_error_is_structured() {
        let mock = Arc::new(MockTransport::new());
        mock.reply(Method::Post, "api/user/register/", 400, json!({"email": ["taken"]}));
        let nav = Arc::new(RecordingNavigator::default());
        let api = client(&mock, &nav);

        let err = api
            .post("api/user/register/", &json!({"email": "a@b.c"}), RequestOptions::public())
            .await
            .unwrap_err();
        assert_eq!(err.field_errors(), Some(&json!({"email": ["taken"]})));
        assert!(nav.routes().is_empty());
    }

    #[tokio::test]
    async fn test_get_failure_is_an_error_not_empty() {
        let mock = Arc::new(MockTransport::new());
        mock.fail(Method::Get, "api/agent/agents/", "connection refused");
        let nav = Arc::new(RecordingNavigator::default());
        let api = client(&mock, &nav);

        let err = api.get("api/agent/agents/", RequestOptions::default()).await.unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
    }

    #[tokio::test]
    async fn test_unauthorized_clears_and_redirects_once() {
        let mock = Arc::new(MockTransport::new().with_delay(std::time::Duration::from_millis(20)));
        mock.always(Method::Get, "api/agent/agents/", 401, json!({"detail": "expired"}));
        let nav = Arc::new(RecordingNavigator::default());
        let api = Arc::new(client(&mock, &nav));
        api.tokens().set_tokens("stale", Some("r"));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let api = api.clone();
            handles.push(tokio::spawn(async move {
                api.get("api/agent/agents/", RequestOptions::default()).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().unwrap_err().is_unauthorized());
        }

        assert_eq!(nav.routes(), vec![Route::SignIn]);
        assert!(api.tokens().credentials().is_none());
        assert!(api.tokens().refresh_token().is_none());
    }

    struct ManualClock(parking_lot::Mutex<chrono::DateTime<chrono::Utc>>);

    impl agentdesk_credentials::Clock for ManualClock {
        fn now(&self) -> chrono::DateTime<chrono::Utc> {
            *self.0.lock()
        }
    }

    #[tokio::test]
    async fn test_unauthorized_after_access_expiry_signs_out() {
        let clock = Arc::new(ManualClock(parking_lot::Mutex::new(chrono::Utc::now())));
        let tokens = Arc::new(TokenStore::with_clock(Default::default(), clock.clone()));
        let mock = Arc::new(MockTransport::new());
        mock.always(Method::Get, "api/agent/agents/", 401, json!({"detail": "not authenticated"}));
        let nav = Arc::new(RecordingNavigator::default());
        let api = ApiClient::new("https://api.example.com", mock.clone(), tokens, nav.clone()).unwrap();

        api.tokens().set_tokens("a", Some("r"));
        *clock.0.lock() += chrono::Duration::days(2);

        let err = api.get("api/agent/agents/", RequestOptions::default()).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(mock.requests()[0].bearer, None);
        assert_eq!(nav.routes(), vec![Route::SignIn]);
        assert!(api.tokens().refresh_token().is_none());
    }

    #[tokio::test]
    async fn test_unauthorized_without_token_redirects_once() {
        let mock = Arc::new(MockTransport::new().with_delay(std::time::Duration::from_millis(20)));
        mock.always(Method::Get, "api/user/profile/", 401, json!({}));
        let nav = Arc::new(RecordingNavigator::default());
        let api = Arc::new(client(&mock, &nav));

        let (a, b) = tokio::join!(
            api.get("api/user/profile/", RequestOptions::default()),
            api.get("api/user/profile/", RequestOptions::default()),
        );
        assert!(a.unwrap_err().is_unauthorized());
        assert!(b.unwrap_err().is_unauthorized());
        assert_eq!(nav.routes(), vec![Route::SignIn]);
    }

    #[tokio::test]
    async fn test_unauthorized_without_token_spares_new_sign_in() {
        let mock = Arc::new(MockTransport::new().with_delay(std::time::Duration::from_millis(30)));
        mock.always(Method::Get, "api/user/profile/", 401, json!({}));
        let nav = Arc::new(RecordingNavigator::default());
        let api = Arc::new(client(&mock, &nav));

        let pending = {
            let api = api.clone();
            tokio::spawn(async move { api.get("api/user/profile/", RequestOptions::default()).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        api.tokens().set_tokens("signed-in", Some("r"));

        assert!(pending.await.unwrap().unwrap_err().is_unauthorized());
        assert!(nav.routes().is_empty());
        assert_eq!(api.tokens().access_token().as_deref(), Some("signed-in"));
    }

    #[tokio::test]
    async fn test_unauthorized_keeps_server_body() {
        let mock = Arc::new(MockTransport::new());
        mock.reply(Method::Get, "api/user/profile/", 401, json!({"detail": "Token is blacklisted"}));
        let nav = Arc::new(RecordingNavigator::default());
        let api = client(&mock, &nav);
        api.tokens().set_tokens("t", None);

        let err = api.get("api/user/profile/", RequestOptions::default()).await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized { status: 401, .. }));
        assert_eq!(err.user_message(), "Token is blacklisted");
    }

    #[tokio::test]
    async fn test_redirect_rearms_after_new_tokens() {
        let mock = Arc::new(MockTransport::new());
        mock.always(Method::Get, "api/user/profile/", 403, json!({}));
        let nav = Arc::new(RecordingNavigator::default());
        let api = client(&mock, &nav);

        api.tokens().set_tokens("first", None);
        let _ = api.get("api/user/profile/", RequestOptions::default()).await;
        api.tokens().set_tokens("second", None);
        let _ = api.get("api/user/profile/", RequestOptions::default()).await;

        assert_eq!(nav.routes(), vec![Route::SignIn, Route::SignIn]);
    }

    #[tokio::test]
    async fn test_suppressed_unauthorized_keeps_tokens() {
        let mock = Arc::new(MockTransport::new());
        mock.always(Method::Get, "api/billing/me/subscription/", 401, json!({}));
        let nav = Arc::new(RecordingNavigator::default());
        let api = client(&mock, &nav);
        api.tokens().set_tokens("t", None);

        let err = api
            .get(
                "api/billing/me/subscription/",
                RequestOptions::default().suppress_redirect(),
            )
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());
        assert!(nav.routes().is_empty());
        assert!(api.tokens().has_access_token());
    }

    #[tokio::test]
    async fn test_public_request_unauthorized_does_not_redirect() {
        let mock = Arc::new(MockTransport::new());
        mock.always(Method::Get, "api/billing/plans/", 401, json!({}));
        let nav = Arc::new(RecordingNavigator::default());
        let api = client(&mock, &nav);
        api.tokens().set_tokens("t", None);

        let _ = api.get("api/billing/plans/", RequestOptions::public()).await;
        assert!(nav.routes().is_empty());
        assert!(api.tokens().has_access_token());
    }

    #[tokio::test]
    async fn test_empty_and_text_bodies() {
        let mock = Arc::new(MockTransport::new());
        mock.reply_raw(Method::Delete, "api/agent/agents/3/", 204, b"");
        mock.reply_raw(Method::Get, "api/health/", 200, b"ok");
        mock.reply_raw(Method::Get, "api/broken/", 502, b"<html>bad gateway</html>");
        let nav = Arc::new(RecordingNavigator::default());
        let api = client(&mock, &nav);

        let deleted = api.delete("api/agent/agents/3/", RequestOptions::default()).await.unwrap();
        assert_eq!(deleted, ApiResponse { status: 204, data: Value::Null });

        let text = api.get("api/health/", RequestOptions::default()).await.unwrap();
        assert_eq!(text.data, json!("ok"));

        let err = api.get("api/broken/", RequestOptions::default()).await.unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 502, .. }));
    }
}
