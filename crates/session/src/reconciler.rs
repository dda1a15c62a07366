use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::user::SessionService;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    None,
    Cleared,
    Fetched,
}

impl SessionService {
    /// Bring the session in line with the token store.
    pub async fn reconcile(&self) -> ReconcileAction {
        let has_token = self.api().tokens().has_access_token();
        let snapshot = self.snapshot();

        if !has_token && snapshot.is_authenticated {
            info!("Access token disappeared, clearing session");
            self.clear_user();
            return ReconcileAction::Cleared;
        }

        if has_token && !snapshot.is_authenticated && !snapshot.loading {
            debug!("Access token present without a session, loading profile");
            if let Err(e) = self.fetch_user_profile().await {
                debug!("Reconcile fetch failed: {}", e);
            }
            return ReconcileAction::Fetched;
        }

        ReconcileAction::None
    }

    /// Run `reconcile` on every token change and, if `poll_interval` is set, on
    /// a timer that also re-reads the durable mirror so changes made by other
    /// processes are noticed.
    pub fn spawn_reconciler(self: &Arc<Self>, poll_interval: Option<Duration>) -> ReconcilerHandle {
        let service = Arc::clone(self);
        let mut changes = self.api().tokens().subscribe();

        let handle = tokio::spawn(async move {
            let mut ticker = poll_interval.map(|period| {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                interval
            });

            loop {
                tokio::select! {
                    changed = changes.changed() => {
                        if changed.is_err() {
                            debug!("Token store dropped, stopping reconciler");
                            break;
                        }
                    }
                    _ = tick(&mut ticker) => {
                        if let Err(e) = service.api().tokens().sync_from_mirror() {
                            warn!("Failed to sync credentials from disk: {}", e);
                        }
                    }
                }
                service.reconcile().await;
            }
        });

        ReconcilerHandle { handle }
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Aborts the reconciler task on `shutdown` or drop.
pub struct ReconcilerHandle {
    handle: JoinHandle<()>,
}

impl ReconcilerHandle {
    pub fn shutdown(self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ReconcilerHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::{SessionService, SessionSnapshot};
    use agentdesk_auth::AuthService;
    use agentdesk_core::paths;
    use agentdesk_credentials::TokenStore;
    use agentdesk_http::mock::{MockTransport, RecordingNavigator};
    use agentdesk_http::{ApiClient, Method};
    use serde_json::json;
    use tokio::sync::watch;

    fn session(mock: Arc<MockTransport>) -> Arc<SessionService> {
        let api = ApiClient::new(
            "https://api.example.com",
            mock,
            Arc::new(TokenStore::in_memory()),
            Arc::new(RecordingNavigator::default()),
        )
        .unwrap();
        let auth = Arc::new(AuthService::new(Arc::new(api)));
        Arc::new(SessionService::new(auth, "https://media.example.com"))
    }

    async fn wait_for(
        rx: &mut watch::Receiver<SessionSnapshot>,
        pred: impl Fn(&SessionSnapshot) -> bool,
    ) -> SessionSnapshot {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let snap = rx.borrow_and_update().clone();
                if pred(&snap) {
                    return snap;
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_reconcile_clears_when_token_vanishes() {
        let mock = Arc::new(MockTransport::new());
        mock.reply(Method::Get, paths::PROFILE, 200, json!({"id": 1, "email": "a@b.c"}));
        let session = session(mock.clone());
        session.api().tokens().set_tokens("a", None);
        session.fetch_user_profile().await.unwrap();

        session.api().tokens().clear_tokens();
        assert_eq!(session.reconcile().await, ReconcileAction::Cleared);
        assert!(!session.is_authenticated());
        assert_eq!(session.reconcile().await, ReconcileAction::None);
    }

    #[tokio::test]
    async fn test_reconcile_fetches_when_token_appears() {
        let mock = Arc::new(MockTransport::new());
        mock.reply(Method::Get, paths::PROFILE, 200, json!({"id": 1, "email": "a@b.c"}));
        let session = session(mock.clone());

        assert_eq!(session.reconcile().await, ReconcileAction::None);
        session.api().tokens().set_tokens("a", None);
        assert_eq!(session.reconcile().await, ReconcileAction::Fetched);
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn test_reconciler_follows_token_changes() {
        let mock = Arc::new(MockTransport::new());
        mock.always(Method::Get, paths::PROFILE, 200, json!({"id": 1, "email": "a@b.c"}));
        let session = session(mock.clone());
        let mut rx = session.subscribe();
        let handle = session.spawn_reconciler(None);

        session.api().tokens().set_tokens("a", Some("r"));
        wait_for(&mut rx, |s| s.is_authenticated).await;

        session.api().tokens().clear_tokens();
        let snap = wait_for(&mut rx, |s| !s.is_authenticated).await;
        assert!(snap.user.is_none());

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_stops_reacting() {
        let mock = Arc::new(MockTransport::new());
        mock.always(Method::Get, paths::PROFILE, 200, json!({"id": 1, "email": "a@b.c"}));
        let session = session(mock.clone());
        let handle = session.spawn_reconciler(Some(Duration::from_millis(10)));
        drop(handle);
        tokio::task::yield_now().await;

        session.api().tokens().set_tokens("a", None);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(mock.count(Method::Get, paths::PROFILE), 0);
        assert!(!session.is_authenticated());
    }
}
