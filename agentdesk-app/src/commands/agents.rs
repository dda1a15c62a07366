use agentdesk_core::{IntegrationKind, OpsResource};
use agentdesk_session::GuardOutcome;
use anyhow::{bail, Result};

use crate::context::AppContext;

async fn require_access(ctx: &AppContext) -> Result<bool> {
    match ctx.guard().check().await {
        GuardOutcome::Ready => Ok(true),
        GuardOutcome::Redirect(_) => Ok(false),
        GuardOutcome::Error(message) => bail!("Could not verify access: {}", message),
    }
}

pub async fn list(ctx: &AppContext) -> Result<()> {
    if !require_access(ctx).await? {
        return Ok(());
    }

    let page = match ctx.agents.fetch_agents().await {
        Ok(page) => page,
        Err(e) => bail!("{}", e.user_message()),
    };
    if page.is_empty() {
        println!("No agents yet");
        return Ok(());
    }
    for agent in &page.items {
        println!(
            "{:>6}  {:<24} {}",
            agent.id,
            agent.agent_name,
            agent.agent_heading.as_deref().unwrap_or("")
        );
    }
    if page.total > page.items.len() {
        println!("… showing {} of {}", page.items.len(), page.total);
    }
    Ok(())
}

pub async fn show(ctx: &AppContext, id: u64) -> Result<()> {
    if !require_access(ctx).await? {
        return Ok(());
    }

    let Some(scope) = ctx.agents.enter_agent(id).await else {
        bail!("Agent {} was not found", id);
    };

    println!("Agent {} ({})", scope.id(), scope.slug());
    println!("  knowledge:  {}", scope.agent_path("knowledge/"));
    for resource in OpsResource::ALL {
        println!("  {:<11} {}", format!("{}:", resource.segment()), scope.ops_path(resource));
    }
    for kind in [IntegrationKind::Website, IntegrationKind::WooCommerce] {
        println!(
            "  {:<11} {}",
            format!("{}:", kind.segment()),
            scope.integration_path(kind, "")
        );
    }
    Ok(())
}
