//! betlink command-line entry point

use betlink::config::ClientConfig;
use betlink::observability::init_default_logging;
use betlink::protocol::ValidateBetRequest;
use betlink::routing::EventFilter;
use betlink::{ClientError, ClientLifecycle, ClientResult, StatusBadge};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Real-time betting client
#[derive(Parser)]
#[command(name = "betlink")]
#[command(about = "Real-time betting client for the betting backend")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "BETLINK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and print state changes and events until interrupted
    Run,
    /// Probe the backend once; exits 0 when reachable
    Health,
    /// Place a single bet
    Bet {
        #[arg(long)]
        user_id: Uuid,
        #[arg(long)]
        match_id: Uuid,
        #[arg(long)]
        amount: f64,
        #[arg(long)]
        odds: f64,
    },
    /// Validate configuration
    Config {
        /// Show the effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_default_logging();

    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e.user_message(), "Failed to load configuration");
            process::exit(e.exit_code());
        }
    };

    let result = match cli.command {
        Commands::Run => run_client(config).await,
        Commands::Health => check_health(config).await,
        Commands::Bet {
            user_id,
            match_id,
            amount,
            odds,
        } => {
            place_bet(
                config,
                ValidateBetRequest {
                    user_id,
                    match_id,
                    amount,
                    odds,
                },
            )
            .await
        }
        Commands::Config { show } => handle_config_command(&config, show),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            error!(error = %e.user_message(), "Command failed");
            process::exit(e.exit_code());
        }
    }
}

fn load_configuration(path: Option<&Path>) -> ClientResult<ClientConfig> {
    match path {
        Some(path) => {
            info!(path = %path.display(), "Loading configuration");
            Ok(ClientConfig::load_from_file(path)?)
        }
        None => {
            let default = Path::new("betlink.toml");
            if default.exists() {
                info!(path = %default.display(), "Loading configuration");
                Ok(ClientConfig::load_from_file(default)?)
            } else {
                Ok(ClientConfig::from_env()?)
            }
        }
    }
}

async fn run_client(config: ClientConfig) -> ClientResult<i32> {
    let client = ClientLifecycle::from_config(config)?;

    client
        .router()
        .register("cli", EventFilter::All, |event| match serde_json::to_string(&event.to_wire()) {
            Ok(line) => println!("event {line}"),
            Err(e) => warn!(error = %e, "Could not render event"),
        });

    let mut transitions = client.state_machine().transitions();
    let mut online = client.store().subscribe();
    let printer = tokio::spawn(async move {
        loop {
            tokio::select! {
                received = transitions.recv() => match received {
                    Ok(t) => println!("state {} -> {} [{}]", t.from, t.to, StatusBadge::from(t.to)),
                    Err(RecvError::Lagged(n)) => warn!(skipped = n, "State printer fell behind"),
                    Err(RecvError::Closed) => break,
                },
                changed = online.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let online = online.borrow_and_update().online;
                    println!("online {online}");
                }
            }
        }
    });

    client.start();
    info!("Client running, press Ctrl-C to stop");

    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .map_err(|e| ClientError::internal(format!("cannot install SIGTERM handler: {e}")))?;
    tokio::select! {
        _ = signal::ctrl_c() => info!("Received SIGINT, shutting down"),
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
    }

    client.shutdown().await;
    printer.abort();
    Ok(0)
}

async fn check_health(config: ClientConfig) -> ClientResult<i32> {
    let client = ClientLifecycle::from_config(config)?;
    let reachable = client.health().poll_once().await;
    println!("{}", if reachable { "reachable" } else { "unreachable" });
    Ok(if reachable { 0 } else { 1 })
}

async fn place_bet(config: ClientConfig, request: ValidateBetRequest) -> ClientResult<i32> {
    let client = ClientLifecycle::from_config(config)?;
    let ticket = client.place_bet(&request).await?;
    if let Some(entry) = client.store().activity_log().first() {
        println!(
            "bet {} on {} at {} ({:?}) in {} ms",
            ticket.amount, ticket.match_id, ticket.odds, ticket.status, entry.latency_ms
        );
    }
    Ok(0)
}

fn handle_config_command(config: &ClientConfig, show: bool) -> ClientResult<i32> {
    config.validate()?;
    if show {
        let rendered = toml::to_string_pretty(config)
            .map_err(|e| ClientError::internal(format!("cannot render configuration: {e}")))?;
        println!("{rendered}");
    } else {
        println!("Configuration is valid");
    }
    Ok(0)
}
