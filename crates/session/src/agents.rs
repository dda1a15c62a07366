use agentdesk_core::{paths, AgentPage, AgentScope, AgentSummary};
use agentdesk_http::{ApiClient, RequestOptions};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::SessionError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectorySnapshot {
    pub agents: AgentPage,
    pub loading: bool,
    pub error: Option<String>,
}

#[derive(Debug, Default)]
struct CurrentAgent {
    active: Option<u64>,
    slugs: HashMap<u64, String>,
}

/// The user's agents plus the agent currently in scope.
///
/// The current agent is tracked by numeric ID. A slug, once resolved for an ID,
/// is reused until that entry is invalidated, so per-agent paths built for the
/// active route never change underneath a caller.
pub struct AgentDirectory {
    api: Arc<ApiClient>,
    state: watch::Sender<DirectorySnapshot>,
    generation: AtomicU64,
    current: Mutex<CurrentAgent>,
}

impl AgentDirectory {
    pub fn new(api: Arc<ApiClient>) -> Self {
        let (state, _) = watch::channel(DirectorySnapshot::default());
        Self {
            api,
            state,
            generation: AtomicU64::new(0),
            current: Mutex::new(CurrentAgent::default()),
        }
    }

    pub fn snapshot(&self) -> DirectorySnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DirectorySnapshot> {
        self.state.subscribe()
    }

    pub fn agents(&self) -> Vec<AgentSummary> {
        self.state.borrow().agents.items.clone()
    }

    pub fn find_by_slug(&self, slug: &str) -> Option<AgentSummary> {
        self.state
            .borrow()
            .agents
            .items
            .iter()
            .find(|a| a.agent_name == slug)
            .cloned()
    }

    /// Load the agent list. On failure the previous list is kept and the
    /// error recorded.
    pub async fn fetch_agents(&self) -> Result<AgentPage, SessionError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_modify(|s| {
            s.loading = true;
            s.error = None;
        });

        let result = match self.api.get(paths::AGENTS, RequestOptions::default()).await {
            Ok(response) => AgentPage::from_response(response.data).map_err(SessionError::from),
            Err(e) => Err(SessionError::from(e)),
        };

        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("Discarding stale agent list (generation {})", generation);
            return Err(SessionError::Superseded);
        }

        match result {
            Ok(page) => {
                info!("Loaded {} agents (total {})", page.items.len(), page.total);
                self.state.send_modify(|s| {
                    s.agents = page.clone();
                    s.loading = false;
                });
                Ok(page)
            }
            Err(e) => {
                warn!("Failed to load agents: {}", e);
                let message = e.user_message();
                self.state.send_modify(|s| {
                    s.loading = false;
                    s.error = Some(message);
                });
                Err(e)
            }
        }
    }

    pub async fn refresh_agents(&self) -> Result<AgentPage, SessionError> {
        self.fetch_agents().await
    }

    /// Fetch a single agent without touching the shared list.
    pub async fn get_agent_by_id(&self, id: u64) -> Option<AgentSummary> {
        match self
            .api
            .get_json::<AgentSummary>(&paths::agent_by_id(id), RequestOptions::default())
            .await
        {
            Ok(agent) => Some(agent),
            Err(e) => {
                warn!("Failed to load agent {}: {}", id, e);
                None
            }
        }
    }

    /// Make `route_id` the active agent, resolving its slug at most once.
    ///
    /// Returns `None` if the agent could not be resolved, or if the route moved
    /// to another agent while the lookup was in flight.
    pub async fn enter_agent(&self, route_id: u64) -> Option<AgentScope> {
        {
            let mut current = self.current.lock();
            current.active = Some(route_id);
            if let Some(slug) = current.slugs.get(&route_id) {
                return Some(AgentScope::new(route_id, slug.clone()));
            }
        }

        let agent = self.get_agent_by_id(route_id).await?;

        let mut current = self.current.lock();
        let slug = current
            .slugs
            .entry(route_id)
            .or_insert(agent.agent_name)
            .clone();
        if current.active != Some(route_id) {
            debug!("Route left agent {} before it resolved", route_id);
            return None;
        }
        Some(AgentScope::new(route_id, slug))
    }

    pub fn set_current_agent_name(&self, id: u64, slug: impl Into<String>) {
        let mut current = self.current.lock();
        current.slugs.insert(id, slug.into());
        current.active = Some(id);
    }

    pub fn leave_agent(&self) {
        self.current.lock().active = None;
    }

    pub fn invalidate_agent(&self, id: u64) {
        self.current.lock().slugs.remove(&id);
    }

    pub fn current_agent_id(&self) -> Option<u64> {
        self.current.lock().active
    }

    pub fn current_agent_name(&self) -> Option<String> {
        let current = self.current.lock();
        current.active.and_then(|id| current.slugs.get(&id).cloned())
    }

    /// `None` while the active agent's slug is unknown; per-agent requests must
    /// wait until this is `Some`.
    pub fn agent_scope(&self) -> Option<AgentScope> {
        let current = self.current.lock();
        let id = current.active?;
        current.slugs.get(&id).map(|slug| AgentScope::new(id, slug.clone()))
    }
}
