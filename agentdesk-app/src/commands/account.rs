use agentdesk_auth::RegistrationRequest;
use anyhow::{bail, Context, Result};
use serde_json::Map;

use crate::context::AppContext;

fn read_password(prompt: &str) -> Result<String> {
    let password = rpassword::prompt_password(prompt).context("Failed to read password")?;
    if password.is_empty() {
        bail!("Password must not be empty");
    }
    Ok(password)
}

pub async fn sign_in(ctx: &AppContext, email: &str) -> Result<()> {
    let password = read_password("Password: ")?;
    if let Err(e) = ctx.auth.sign_in(email, &password).await {
        bail!("{}", e.user_message());
    }

    let user = ctx
        .session
        .fetch_user_profile()
        .await
        .context("Signed in, but the profile could not be loaded")?;
    println!("✓ Signed in as {} <{}>", user.display_name(), user.email);
    Ok(())
}

pub async fn sign_up(
    ctx: &AppContext,
    email: &str,
    first_name: Option<String>,
    last_name: Option<String>,
) -> Result<()> {
    let password = read_password("Choose a password: ")?;
    let confirm = read_password("Repeat password: ")?;
    if password != confirm {
        bail!("Passwords do not match");
    }

    let request = RegistrationRequest {
        email: email.to_string(),
        password,
        first_name: first_name.unwrap_or_default(),
        last_name: last_name.unwrap_or_default(),
        extra: Map::new(),
    };

    let pair = match ctx.auth.register(&request).await {
        Ok(pair) => pair,
        Err(e) => bail!("{}", e.user_message()),
    };
    match pair {
        Some(_) => {
            let user = ctx.session.fetch_user_profile().await?;
            println!("✓ Account created, signed in as {}", user.email);
        }
        None => println!("✓ Account created. Run `agentdesk signin --email {}`", email),
    }
    Ok(())
}

pub async fn logout(ctx: &AppContext) -> Result<()> {
    ctx.auth.logout().await;
    ctx.session.clear_user();
    println!("✓ Signed out");
    Ok(())
}

pub async fn whoami(ctx: &AppContext) -> Result<()> {
    let snapshot = ctx.session.start().await;
    match snapshot.user {
        Some(user) if snapshot.is_authenticated => {
            println!("{} <{}>", user.display_name(), user.email);
            println!("  id:    {}", user.id);
            if let Some(url) = &user.profile_image_url {
                println!("  photo: {}", url);
            }
        }
        _ => {
            println!("Not signed in");
            if let Some(error) = snapshot.error {
                println!("  ({})", error);
            }
        }
    }
    Ok(())
}
