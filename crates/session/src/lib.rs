//! Application-wide session state: the signed-in user, the agent directory and
//! the route guard that gates protected screens.

pub mod agents;
pub mod guard;
pub mod reconciler;
pub mod user;

use agentdesk_auth::AuthError;
use agentdesk_core::ShapeError;
use agentdesk_http::ApiError;
use thiserror::Error;

pub use agents::{AgentDirectory, DirectorySnapshot};
pub use guard::{GuardOutcome, GuardState, RouteGuard};
pub use reconciler::{ReconcileAction, ReconcilerHandle, DEFAULT_POLL_INTERVAL};
pub use user::{SessionPhase, SessionService, SessionSnapshot};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{0}")]
    Api(#[from] ApiError),
    #[error("{0}")]
    Auth(#[from] AuthError),
    #[error("{0}")]
    Shape(#[from] ShapeError),
    #[error("Not signed in")]
    NotAuthenticated,
    #[error("Superseded by a newer request")]
    Superseded,
    #[error("Invalid profile update: {0}")]
    InvalidPatch(String),
}

impl SessionError {
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Api(e) => e.user_message(),
            SessionError::Auth(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}
