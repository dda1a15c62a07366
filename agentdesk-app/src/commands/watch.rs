use agentdesk_session::SessionPhase;
use anyhow::Result;
use tracing::info;

use crate::context::AppContext;

/// Keep the session in sync with the credential store and report every
/// transition until interrupted.
pub async fn run(ctx: &AppContext) -> Result<()> {
    let mut updates = ctx.session.subscribe();
    let reconciler = ctx.session.spawn_reconciler(ctx.config.reconcile_interval());
    ctx.session.start().await;

    let mut last = None;
    loop {
        let snapshot = updates.borrow_and_update().clone();
        if last != Some(snapshot.phase) {
            match snapshot.phase {
                SessionPhase::Loading => println!("… loading session"),
                SessionPhase::Authenticated => {
                    let who = snapshot
                        .user
                        .as_ref()
                        .map(|u| u.email.clone())
                        .unwrap_or_default();
                    println!("● signed in as {}", who);
                }
                SessionPhase::Unauthenticated => println!("○ signed out"),
            }
            last = Some(snapshot.phase);
        }

        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping watch");
                break;
            }
        }
    }

    reconciler.shutdown();
    Ok(())
}
