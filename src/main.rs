//! Beacon server binary entry point.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use beacon::config::ServerConfig;
use beacon::coordinator::Coordinator;
use beacon::server::RealtimeServer;
use beacon::store::memory::{InMemoryMessageStore, InMemoryNotificationStore, InMemoryUserStore};
use beacon::store::UserRecord;

#[derive(Parser)]
#[command(
    name = "beacon-server",
    about = "Realtime presence, streaming, and notification server"
)]
struct Cli {
    /// Path to a TOML config file overlaying env/default settings.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bind address override (takes precedence over config file and env).
    #[arg(long)]
    bind: Option<String>,

    /// Comma-separated user identities to seed into the in-memory user store.
    #[arg(long, value_delimiter = ',')]
    seed_users: Vec<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    if let Err(error) = run(cli).await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("BEACON_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run(cli: Cli) -> beacon::error::Result<()> {
    let mut config = ServerConfig::load(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }

    let users = Arc::new(InMemoryUserStore::new());
    for user_id in &cli.seed_users {
        users.insert(UserRecord::new(user_id.as_str())).await;
    }

    let coordinator = Coordinator::new(
        users,
        Arc::new(InMemoryMessageStore::new()),
        Arc::new(InMemoryNotificationStore::new()),
    );
    let (handle, coordinator_task) = coordinator.spawn();

    let server = RealtimeServer::bind(&config, handle).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server_task = tokio::spawn(server.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    let _ = shutdown_tx.send(true);
    let _ = server_task.await;
    let _ = coordinator_task.await;
    Ok(())
}
