use agentdesk_core::{paths, Route, SubscriptionStatus};
use agentdesk_http::{ApiClient, ApiError, RequestOptions};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardState {
    Checking,
    Redirecting(Route),
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    Ready,
    Redirect(Route),
    /// The check could not complete; the caller may retry.
    Error(String),
}

/// Gate for a protected screen. Once it has decided (ready or redirect) the
/// decision sticks; only an inconclusive check is re-run. Concurrent checks
/// run one at a time, so a decision is reached and acted on once.
pub struct RouteGuard {
    api: Arc<ApiClient>,
    require_plan: bool,
    state: Mutex<GuardState>,
    in_flight: tokio::sync::Mutex<()>,
}

impl RouteGuard {
    /// Guard that only requires a signed-in user.
    pub fn authenticated(api: Arc<ApiClient>) -> Self {
        Self::new(api, false)
    }

    /// Guard that also requires an active subscription plan.
    pub fn subscribed(api: Arc<ApiClient>) -> Self {
        Self::new(api, true)
    }

    pub fn new(api: Arc<ApiClient>, require_plan: bool) -> Self {
        Self {
            api,
            require_plan,
            state: Mutex::new(GuardState::Checking),
            in_flight: tokio::sync::Mutex::new(()),
        }
    }

    pub fn state(&self) -> GuardState {
        self.state.lock().clone()
    }

    pub async fn check(&self) -> GuardOutcome {
        let _in_flight = self.in_flight.lock().await;
        match self.state() {
            GuardState::Ready => return GuardOutcome::Ready,
            GuardState::Redirecting(route) => return GuardOutcome::Redirect(route),
            GuardState::Checking => {}
        }

        if !self.api.tokens().has_access_token() {
            debug!("No access token, redirecting to sign-in");
            return self.redirect(Route::SignIn);
        }

        if !self.require_plan {
            return self.ready();
        }

        let result = self
            .api
            .get_json::<SubscriptionStatus>(
                paths::SUBSCRIPTION,
                RequestOptions::default().suppress_redirect(),
            )
            .await;

        match result {
            Ok(status) if status.has_active_plan() => self.ready(),
            Ok(_) => {
                info!("No active plan, redirecting to plan selection");
                self.redirect(Route::SelectPlan)
            }
            Err(ApiError::Validation { status: 404, .. }) | Err(ApiError::Status { status: 404, .. }) => {
                info!("No subscription on record, redirecting to plan selection");
                self.redirect(Route::SelectPlan)
            }
            Err(e) if e.is_unauthorized() => {
                self.api.tokens().clear_tokens();
                warn!("Subscription check rejected the session");
                self.redirect(Route::SignIn)
            }
            Err(e) => {
                warn!("Subscription check failed: {}", e);
                GuardOutcome::Error(e.user_message())
            }
        }
    }

    fn ready(&self) -> GuardOutcome {
        *self.state.lock() = GuardState::Ready;
        GuardOutcome::Ready
    }

    fn redirect(&self, route: Route) -> GuardOutcome {
        *self.state.lock() = GuardState::Redirecting(route.clone());
        self.api.navigator().navigate(route.clone());
        GuardOutcome::Redirect(route)
    }
}
