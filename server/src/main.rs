use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::{error, info};
use tokio::net::TcpListener;

use server::session;
use server::state::{ServerConfig, ServerState};

/// Authoritative Aetharia world server.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Listening port
    #[arg(long, env = "PORT", default_value_t = shared::DEFAULT_PORT)]
    port: u16,

    /// World generation seed
    #[arg(long, env = "AETHARIA_WORLD_SEED", default_value_t = shared::DEFAULT_SEED)]
    seed: u64,

    /// Heartbeat period in milliseconds
    #[arg(long, env = "AETHARIA_HEARTBEAT", default_value_t = shared::DEFAULT_HEARTBEAT_MS)]
    heartbeat_ms: u64,

    /// Enable debug logging
    #[arg(long, env = "AETHARIA_DEBUG")]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let default_filter = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let config = ServerConfig {
        port: args.port,
        seed: args.seed,
        heartbeat: Duration::from_millis(args.heartbeat_ms),
        debug: args.debug,
    };

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Aetharia server listening on {} (seed {})", addr, config.seed);

    let state = Arc::new(ServerState::new(config));

    tokio::spawn(server::physics::run(Arc::clone(&state)));
    tokio::spawn(session::run_heartbeat(Arc::clone(&state)));

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    session::handle_connection(state, stream, peer).await;
                });
            }
            Err(e) => {
                error!("accept failed: {}", e);
            }
        }
    }
}
