use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;

use attesta::authz::sync_teams;
use attesta::config::Config;
use attesta::store::InMemoryStore;
use attesta::web::{self, ApiDoc, AppState};
use attesta::workflow::WorkflowRegistry;
use attesta::{env_vars, logging};

#[derive(Parser)]
#[command(name = "attesta")]
#[command(about = "Compliance workflow back-office with notarized attestations")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web server (default)
    Serve {
        /// Port to listen on (default: server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Create configured departments and workflow teams in the identity service
    SyncTeams,

    /// List supported environment variables
    Env,

    /// Print the effective configuration as TOML
    Config,

    /// Print the OpenAPI document
    Openapi {
        /// Emit YAML instead of JSON
        #[arg(long)]
        yaml: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    let _logging = logging::init_logging(&config, cli.debug)?;

    match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            cmd_serve(config).await?;
        }
        Commands::SyncTeams => {
            cmd_sync_teams(&config).await?;
        }
        Commands::Env => {
            print!("{}", env_vars::render_text());
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
        Commands::Openapi { yaml } => {
            let doc = if yaml { ApiDoc::yaml()? } else { ApiDoc::json()? };
            println!("{}", doc);
        }
    }

    Ok(())
}

fn load_registry(config: &Config) -> Result<Arc<WorkflowRegistry>> {
    let dir = config.workflows_path();
    let registry = WorkflowRegistry::load(dir.as_deref()).context("Failed to load workflow definitions")?;
    if !registry.contains(&config.workflows.default_key) {
        anyhow::bail!(
            "Default workflow '{}' is not defined (known: {})",
            config.workflows.default_key,
            registry.keys().join(", ")
        );
    }
    Ok(Arc::new(registry))
}

async fn cmd_serve(config: Config) -> Result<()> {
    let registry = load_registry(&config)?;
    let store = Arc::new(InMemoryStore::new());
    let state = AppState::from_config(config, registry, store)?;

    if let (Some(email), Some(password)) = (
        state.config.auth.bootstrap_admin_email.as_deref(),
        state.config.auth.bootstrap_admin_password.as_deref(),
    ) {
        state.accounts.ensure_bootstrap_admin(email, password).await?;
    }
    if state.config.auth.legacy_cookie {
        tracing::warn!("Legacy demo_user cookie identities are accepted");
    }

    web::serve(state).await
}

async fn cmd_sync_teams(config: &Config) -> Result<()> {
    let registry = load_registry(config)?;
    // Standalone runs have no user records; teams are still reconciled
    let store = InMemoryStore::new();
    let report = sync_teams(&config.identity, &registry, &store).await?;

    println!("Teams:       {} created, {} existing", report.teams_created, report.teams_existing);
    println!("Users:       {} created, {} existing", report.users_created, report.users_existing);
    println!(
        "Memberships: {} created, {} existing",
        report.memberships_created, report.memberships_existing
    );
    Ok(())
}
