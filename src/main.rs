use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use weclaw::config::Config;
use weclaw::{gateway, providers};

/// WeClaw: a WeChat Official Account gateway for chat completions.
#[derive(Parser, Debug)]
#[command(name = "weclaw")]
#[command(version)]
#[command(about = "Bridge WeChat Official Account messages to an OpenAI-compatible model.", long_about = None)]
struct Cli {
    /// Path to the config file (defaults to ./weclaw.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the webhook gateway
    Serve {
        /// Bind host (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Bind port (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Check configuration and provider reachability
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging - respects RUST_LOG env var, defaults to INFO
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.gateway.host.clone());
            let port = port.unwrap_or(config.gateway.port);

            if config.provider.api_key.is_none() {
                warn!("no provider API key configured; every reply will use the fallback text");
            }

            info!("🚀 Starting WeClaw gateway on {host}:{port}");
            gateway::run_gateway(&host, port, config).await
        }

        Commands::Doctor => doctor(&config).await,
    }
}

async fn doctor(config: &Config) -> Result<()> {
    println!("WeClaw doctor");

    let token_status = if config.wechat.token.is_empty() {
        "MISSING (URL verification will be rejected)"
    } else {
        "configured"
    };
    println!("  wechat token:     {token_status}");

    let key_status = if config.provider.api_key.is_some() {
        "configured"
    } else {
        "MISSING (every reply will use the fallback text)"
    };
    println!("  provider api key: {key_status}");

    let provider = providers::create_provider(
        &config.provider.name,
        config.provider.api_key.as_deref(),
        config.provider.api_url.as_deref(),
        config.provider.timeout_secs,
        config.provider.connect_timeout_secs,
    )?;

    let reachable = if provider.health_check().await {
        "reachable"
    } else {
        "UNREACHABLE"
    };
    println!(
        "  provider {} ({}): {reachable}",
        provider.name(),
        config.provider.model
    );

    Ok(())
}
