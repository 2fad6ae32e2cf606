use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

use gmail_triage::auth::{load_app_secret, OAuthClient};
use gmail_triage::config::Config;
use gmail_triage::server::{self, App};

/// Watches a mailbox for new messages and stars the ones whose images match
/// a target concept
#[derive(Parser, Debug)]
#[command(name = "gmail-triage", version, about)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Install default crypto provider for rustls
    // Multiple dependencies pull in different providers, so pick one up front
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_triage=debug,info"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_triage=info,warn,error"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    tracing::info!("Gmail image triage starting...");

    let config = Config::load(&cli.config).await?;
    let secret = load_app_secret(Path::new(&config.auth.credentials_path)).await?;
    let oauth = OAuthClient::new(secret);

    let app = App::new(config, oauth)?;
    server::serve(app).await?;

    Ok(())
}
