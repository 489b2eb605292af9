use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use slackrelay::config::Config;
use slackrelay::infra::SessionSweeper;
use slackrelay::relay::{HttpRelayClient, RelayProvider};
use slackrelay::router::EventRouter;
use slackrelay::sessions::create_session_store;
use slackrelay::slack::{ChatTransport, SlackApiClient, SocketModeRuntime};

/// `slackrelay` - thread-aware Slack to agent relay.
#[derive(Parser, Debug)]
#[command(name = "slackrelay")]
#[command(version)]
#[command(about = "Relay Slack mentions and DMs to a remote conversational agent.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Connect to Slack and relay messages to the agent
    #[command(long_about = "\
Connect to Slack over Socket Mode and relay messages to the agent.

Requires a bot token, an app-level token, and the agent endpoint plus
API key; set them in config.toml or export SLACK_BOT_TOKEN,
SLACK_APP_TOKEN, RELAY_ENDPOINT, and RELAY_API_KEY. Startup fails
before any connection is opened if one is missing.

Examples:
  slackrelay serve
  RUST_LOG=debug slackrelay serve")]
    Serve,

    /// Show resolved configuration (tokens redacted)
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install default crypto provider for Rustls TLS. Both reqwest and
    // tokio-tungstenite link rustls; installing once up front avoids the
    // "could not automatically determine the process-level CryptoProvider"
    // error when more than one provider is available.
    if let Err(e) = rustls::crypto::ring::default_provider().install_default() {
        eprintln!("Warning: Failed to install default crypto provider: {e:?}");
    }

    // Initialize logging - respects RUST_LOG env var, defaults to INFO
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let cli = Cli::parse();
    let config = Config::load_or_init().await?;

    match cli.command {
        Commands::Serve => serve(config).await,
        Commands::Status => {
            print_status(&config);
            Ok(())
        }
    }
}

async fn serve(config: Config) -> Result<()> {
    config.require_credentials()?;

    let bot_token = config.slack.bot_token.clone().unwrap_or_default();
    let app_token = config.slack.app_token.clone().unwrap_or_default();
    let slack_client = SlackApiClient::new(
        &config.slack.api_base,
        &app_token,
        &bot_token,
        Duration::from_secs(config.slack.request_timeout_secs),
    )?;

    let bot_user_id = slack_client.resolve_bot_user_id().await?;
    info!(bot_user_id = %bot_user_id, "authenticated with slack");

    let store = create_session_store(config.sessions.expiry());
    let relay = Arc::new(HttpRelayClient::new(&config.relay)) as Arc<dyn RelayProvider>;
    let chat = Arc::new(slack_client.clone()) as Arc<dyn ChatTransport>;
    let router = Arc::new(EventRouter::new(
        Arc::clone(&store),
        relay,
        chat,
        &bot_user_id,
    )?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweeper = SessionSweeper::new(
        Arc::clone(&store),
        config.sessions.sweep_interval(),
        shutdown_rx.clone(),
    );
    let sweeper_handle = tokio::spawn(sweeper.run());

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            let _ = shutdown_tx.send(true);
        }
    });

    let mut runtime = SocketModeRuntime::new(
        slack_client,
        router,
        bot_user_id,
        config.slack.reconnect_delay(),
        shutdown_rx,
    );
    runtime.run().await?;

    let _ = sweeper_handle.await;
    info!("slackrelay stopped");
    Ok(())
}

fn print_status(config: &Config) {
    let present = |value: &Option<String>| {
        if value.as_deref().is_some_and(|v| !v.trim().is_empty()) {
            "✅ set"
        } else {
            "❌ missing"
        }
    };

    println!("slackrelay status");
    println!();
    println!("Version:     {}", env!("CARGO_PKG_VERSION"));
    println!("Config:      {}", config.source_path().display());
    println!();
    println!("Slack:");
    println!("  API base:       {}", config.slack.api_base);
    println!("  Bot token:      {}", present(&config.slack.bot_token));
    println!("  App token:      {}", present(&config.slack.app_token));
    println!();
    println!("Relay:");
    println!(
        "  Endpoint:       {}",
        if config.relay.endpoint.trim().is_empty() {
            "(not set)"
        } else {
            config.relay.endpoint.as_str()
        }
    );
    println!("  API key:        {}", present(&config.relay.api_key));
    println!("  Agent id:       {}", config.relay.agent_id);
    println!("  Timeout:        {}s", config.relay.timeout_secs);
    println!();
    println!("Sessions:");
    println!("  Expiry:         {}h", config.sessions.expiry_hours);
    println!("  Sweep interval: {}h", config.sessions.sweep_interval_hours);
}
