use agentdesk_app::commands::{account, agents, billing, profile, watch};
use agentdesk_app::{AppContext, Config};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Agentdesk console client
#[derive(Parser)]
#[command(name = "agentdesk")]
#[command(version)]
#[command(about = "Manage your Agentdesk session, profile and agents", long_about = None)]
struct Cli {
    /// Path to the config file (defaults to ./config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with email and password
    Signin {
        #[arg(long)]
        email: String,
    },
    /// Create an account
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
    },
    /// Sign out and forget stored credentials
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Edit your profile
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },
    /// List your agents
    Agents,
    /// Open one agent and show its resource paths
    Agent { id: u64 },
    /// List subscription plans
    Plans,
    /// Show your current subscription
    Subscription,
    /// Follow session changes until Ctrl-C
    Watch,
}

#[derive(Subcommand)]
enum ProfileAction {
    /// Update fields, e.g. `first_name=Ada`
    Set {
        #[arg(required = true)]
        fields: Vec<String>,
    },
    /// Upload a new profile photo
    Photo { file: PathBuf },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("agentdesk=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = Config::load(cli.config.as_deref())?;
    let ctx = AppContext::from_config(config)?;

    match cli.command {
        Commands::Signin { email } => account::sign_in(&ctx, &email).await,
        Commands::Signup {
            email,
            first_name,
            last_name,
        } => account::sign_up(&ctx, &email, first_name, last_name).await,
        Commands::Logout => account::logout(&ctx).await,
        Commands::Whoami => account::whoami(&ctx).await,
        Commands::Profile { action } => match action {
            ProfileAction::Set { fields } => profile::set(&ctx, &fields).await,
            ProfileAction::Photo { file } => profile::photo(&ctx, &file).await,
        },
        Commands::Agents => agents::list(&ctx).await,
        Commands::Agent { id } => agents::show(&ctx, id).await,
        Commands::Plans => billing::plans(&ctx).await,
        Commands::Subscription => billing::subscription(&ctx).await,
        Commands::Watch => watch::run(&ctx).await,
    }
}
