//! streamcaster daemon
//!
//! Wires config loading, logging, the relay server, the broadcast
//! dispatcher, and the admin API, then runs until ctrl-c.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use streamcaster::admin::{AdminServer, JsonConfigStore};
use streamcaster::broadcast::BroadcastDispatcher;
use streamcaster::registry::Registry;
use streamcaster::{RelayConfig, RelayServer};

#[derive(Debug, Parser)]
#[command(name = "streamcaster", about = "Live-audio relay")]
struct Args {
    /// Path to the JSON settings file
    #[arg(long, env = "STREAMCASTER_CONFIG", default_value = "app_settings.json")]
    config: PathBuf,

    /// Relay bind address
    #[arg(long, env = "STREAMCASTER_BIND", default_value = "0.0.0.0:2101")]
    bind: SocketAddr,

    /// Admin API bind address
    #[arg(long, env = "STREAMCASTER_ADMIN_BIND", default_value = "0.0.0.0:8000")]
    admin_bind: SocketAddr,

    /// Shared source/admin password
    #[arg(
        long,
        env = "STREAMCASTER_PASSWORD",
        default_value = "server_password",
        hide_env_values = true
    )]
    password: String,

    /// Maximum concurrent relay connections (0 = unlimited)
    #[arg(long, env = "STREAMCASTER_MAX_CONNECTIONS", default_value_t = 0)]
    max_connections: usize,
}

#[tokio::main]
async fn main() -> streamcaster::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let store = Arc::new(JsonConfigStore::new(&args.config));
    let (streampoints, users) = store.load()?.into_seed();
    tracing::info!(
        config = %args.config.display(),
        streampoints = streampoints.len(),
        users = users.len(),
        "Config loaded"
    );

    let registry = Arc::new(Registry::with_seed(streampoints, users, store));

    let config = RelayConfig::default()
        .bind(args.bind)
        .source_password(args.password.clone())
        .max_connections(args.max_connections);

    let (queue, dispatcher) = BroadcastDispatcher::channel(Arc::clone(&registry), &config);
    tokio::spawn(dispatcher.run());

    let admin = AdminServer::new(args.admin_bind, Arc::clone(&registry), args.password);
    tokio::spawn(async move {
        if let Err(e) = admin.run().await {
            tracing::error!(error = %e, "Admin API failed");
        }
    });

    let server = RelayServer::new(config, registry, queue);
    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
}
