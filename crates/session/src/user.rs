use agentdesk_auth::AuthService;
use agentdesk_core::{paths, profile_image_url, UserProfile};
use agentdesk_http::{ApiClient, MultipartForm, RequestOptions};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Unauthenticated,
    Loading,
    Authenticated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub user: Option<UserProfile>,
    pub is_authenticated: bool,
    pub loading: bool,
    pub error: Option<String>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Unauthenticated,
            user: None,
            is_authenticated: false,
            loading: false,
            error: None,
        }
    }
}

impl SessionSnapshot {
    fn refresh_phase(&mut self) {
        self.phase = if self.loading {
            SessionPhase::Loading
        } else if self.is_authenticated {
            SessionPhase::Authenticated
        } else {
            SessionPhase::Unauthenticated
        };
    }
}

/// Owns the signed-in user's profile and the derived authentication flag.
///
/// `is_authenticated` is only ever true while an access token exists and the
/// last profile fetch succeeded. Every fetch takes a generation number; a fetch
/// that finishes after a newer fetch (or a `clear_user`) started drops its
/// result instead of overwriting fresher state.
pub struct SessionService {
    api: Arc<ApiClient>,
    auth: Arc<AuthService>,
    media_base_url: String,
    state: watch::Sender<SessionSnapshot>,
    generation: AtomicU64,
}

impl SessionService {
    pub fn new(auth: Arc<AuthService>, media_base_url: impl Into<String>) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::default());
        Self {
            api: auth.api().clone(),
            auth,
            media_base_url: media_base_url.into(),
            state,
            generation: AtomicU64::new(0),
        }
    }

    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    pub fn auth(&self) -> &Arc<AuthService> {
        &self.auth
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.state.borrow().user.clone()
    }

    /// Initial load: fetch the profile if any credential could authenticate it.
    pub async fn start(&self) -> SessionSnapshot {
        let tokens = self.api.tokens();
        if tokens.has_access_token() || tokens.refresh_token().is_some() {
            if let Err(e) = self.fetch_user_profile().await {
                debug!("Initial profile load failed: {}", e);
            }
        } else {
            debug!("No stored credentials, starting signed out");
        }
        self.snapshot()
    }

    pub async fn fetch_user_profile(&self) -> Result<UserProfile, SessionError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_modify(|s| {
            s.loading = true;
            s.refresh_phase();
        });

        let tokens = self.api.tokens();
        if !tokens.has_access_token() {
            if tokens.refresh_token().is_none() {
                return self.fail(generation, SessionError::NotAuthenticated);
            }
            debug!("Access token missing, refreshing before profile fetch");
            if let Err(e) = self.auth.refresh().await {
                return self.fail(generation, e.into());
            }
        }

        let result = self
            .api
            .get_json::<UserProfile>(paths::PROFILE, RequestOptions::default())
            .await;

        if !self.is_current(generation) {
            debug!("Discarding stale profile response (generation {})", generation);
            return Err(SessionError::Superseded);
        }

        match result {
            Ok(mut user) => {
                user.profile_image_url =
                    profile_image_url(&self.media_base_url, user.photo.as_deref());
                info!("Session established for {}", user.email);
                self.state.send_modify(|s| {
                    s.user = Some(user.clone());
                    s.is_authenticated = true;
                    s.loading = false;
                    s.error = None;
                    s.refresh_phase();
                });
                Ok(user)
            }
            Err(e) => self.fail(generation, e.into()),
        }
    }

    /// Shallow-merge `partial` into the current user. Returns the merged
    /// profile, or `None` when nobody is signed in.
    pub fn update_user(&self, partial: &Value) -> Result<Option<UserProfile>, SessionError> {
        let Value::Object(patch) = partial else {
            return Err(SessionError::InvalidPatch("expected a JSON object".into()));
        };

        let Some(current) = self.user() else {
            return Ok(None);
        };

        let mut merged = match serde_json::to_value(&current) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Err(SessionError::InvalidPatch("profile is not an object".into())),
            Err(e) => return Err(SessionError::InvalidPatch(e.to_string())),
        };
        for (key, value) in patch {
            merged.insert(key.clone(), value.clone());
        }

        let mut user: UserProfile = serde_json::from_value(Value::Object(merged))
            .map_err(|e| SessionError::InvalidPatch(e.to_string()))?;
        user.profile_image_url = profile_image_url(&self.media_base_url, user.photo.as_deref());

        self.state.send_modify(|s| {
            if s.user.is_some() {
                s.user = Some(user.clone());
            }
        });
        Ok(Some(user))
    }

    pub fn clear_user(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.state.send_replace(SessionSnapshot::default());
        debug!("Session cleared");
    }

    /// Persist profile edits, then reload the canonical profile.
    pub async fn save_profile(&self, patch: &Value) -> Result<UserProfile, SessionError> {
        self.api
            .patch(paths::PROFILE, patch, RequestOptions::default())
            .await?;
        self.fetch_user_profile().await
    }

    pub async fn upload_profile_photo(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        mime: &str,
    ) -> Result<UserProfile, SessionError> {
        let form = MultipartForm::new().file("photo", file_name, mime, bytes);
        self.api
            .patch_multipart(paths::PROFILE_PHOTO, form, RequestOptions::default())
            .await?;
        self.fetch_user_profile().await
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn fail(&self, generation: u64, error: SessionError) -> Result<UserProfile, SessionError> {
        if !self.is_current(generation) {
            return Err(SessionError::Superseded);
        }
        warn!("Profile fetch failed: {}", error);
        let message = error.user_message();
        self.state.send_modify(|s| {
            s.user = None;
            s.is_authenticated = false;
            s.loading = false;
            s.error = Some(message);
            s.refresh_phase();
        });
        Err(error)
    }
}
