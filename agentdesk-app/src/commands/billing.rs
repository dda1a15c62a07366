use agentdesk_core::{paths, plans_from_response, SubscriptionStatus};
use agentdesk_http::RequestOptions;
use anyhow::Result;

use crate::context::AppContext;

pub async fn plans(ctx: &AppContext) -> Result<()> {
    let response = ctx.api.get(paths::PLANS, RequestOptions::public()).await?;
    let plans = plans_from_response(response.data)?;
    if plans.is_empty() {
        println!("No plans available");
    }
    for plan in plans {
        let interval = plan.interval.as_deref().unwrap_or("-");
        println!("{:<16} {:<24} {}", plan.code, plan.name, interval);
    }
    Ok(())
}

pub async fn subscription(ctx: &AppContext) -> Result<()> {
    let status: SubscriptionStatus = ctx
        .api
        .get_json(paths::SUBSCRIPTION, RequestOptions::default())
        .await?;
    match status.plan_code.as_deref().filter(|_| status.has_active_plan()) {
        Some(code) => {
            println!("Plan:   {}", code);
            println!("Status: {}", status.status.as_deref().unwrap_or("unknown"));
            if let Some(end) = &status.current_period_end {
                println!("Renews: {}", end);
            }
        }
        None => println!("No active plan"),
    }
    Ok(())
}
