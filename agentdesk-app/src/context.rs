use agentdesk_auth::AuthService;
use agentdesk_core::{Navigator, Route};
use agentdesk_credentials::{load_or_create_master_key, DurableMirror, TokenLifetimes, TokenStore};
use agentdesk_http::{ApiClient, HttpTransport, ReqwestTransport};
use agentdesk_session::{AgentDirectory, RouteGuard, SessionService};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::debug;

use crate::config::Config;

/// Prints where the app would navigate; the terminal has no router.
#[derive(Debug, Default)]
pub struct PrintNavigator;

impl Navigator for PrintNavigator {
    fn navigate(&self, route: Route) {
        match route {
            Route::SignIn => eprintln!("→ Signed out. Run `agentdesk signin` to continue."),
            Route::SelectPlan => {
                eprintln!("→ No active plan. Run `agentdesk plans` to pick one.")
            }
            other => eprintln!("→ {}", other),
        }
    }
}

/// Every service the commands need, wired to one token store.
pub struct AppContext {
    pub config: Config,
    pub api: Arc<ApiClient>,
    pub auth: Arc<AuthService>,
    pub session: Arc<SessionService>,
    pub agents: Arc<AgentDirectory>,
}

impl AppContext {
    pub fn from_config(config: Config) -> Result<Self> {
        let key = load_or_create_master_key(config.master_key_path())
            .context("Failed to load credential key")?;
        let mirror = DurableMirror::new(config.credentials_dir(), &key)
            .context("Failed to open credential store")?;
        let tokens = TokenStore::restore(mirror, TokenLifetimes::default())
            .context("Failed to restore credentials")?;
        debug!("Credentials restored from {}", config.credentials_dir().display());

        let transport = Arc::new(ReqwestTransport::new(config.request_timeout()));
        Self::with_parts(config, transport, tokens, Arc::new(PrintNavigator))
    }

    pub fn with_parts(
        config: Config,
        transport: Arc<dyn HttpTransport>,
        tokens: TokenStore,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self> {
        let api = Arc::new(ApiClient::new(
            &config.api_base_url,
            transport,
            Arc::new(tokens),
            navigator,
        )?);
        let auth = Arc::new(AuthService::new(api.clone()));
        let session = Arc::new(SessionService::new(auth.clone(), config.media_base_url()));
        let agents = Arc::new(AgentDirectory::new(api.clone()));

        Ok(Self {
            config,
            api,
            auth,
            session,
            agents,
        })
    }

    pub fn guard(&self) -> RouteGuard {
        RouteGuard::new(self.api.clone(), self.config.check_subscription)
    }
}
