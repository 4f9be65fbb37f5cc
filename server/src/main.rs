use std::sync::Arc;

use clap::Parser;
use log::info;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;

use gridlink_server::auth::TokenVerifier;
use gridlink_server::endpoints::EndpointPicker;
use gridlink_server::engine::{GameConfig, SessionEngine};
use gridlink_server::error::ServerError;
use gridlink_server::graph::GraphStore;
use gridlink_server::matchmaker::Matchmaker;
use gridlink_server::network::{self, ServerState};
use gridlink_server::stats::StatsWriter;

/// Gridlink game server.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Address to bind the WebSocket listener to
    #[clap(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[clap(short, long, default_value = "8080")]
    port: u16,

    /// Postgres connection string
    #[clap(long, env = "DATABASE_URL")]
    database_url: String,

    /// HS256 secret for verifying handshake bearer tokens
    #[clap(long, env = "GRIDLINK_JWT_SECRET", hide_env_values = true)]
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    env_logger::init();
    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Warning: RUST_LOG not set. Recommended: RUST_LOG=info");
    }

    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&args.database_url)
        .await?;

    // The snapshot must be fully populated before any client is accepted.
    let graph = Arc::new(GraphStore::load(&pool).await?);

    let picker = Arc::new(EndpointPicker::new(graph.clone()));
    let stats = Arc::new(StatsWriter::new(pool));
    let engine = Arc::new(SessionEngine::new(
        graph,
        GameConfig::default(),
        Some(stats),
    ));
    let matchmaker = Arc::new(Matchmaker::new(picker.clone()));
    let state = Arc::new(ServerState {
        engine,
        matchmaker,
        picker,
        verifier: TokenVerifier::new(&args.jwt_secret),
    });

    let listener = TcpListener::bind(&addr).await?;
    info!("listening on {}", addr);

    tokio::select! {
        result = network::run(listener, state.clone()) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
            for handle in state.matchmaker.drain() {
                handle.send(gridlink_shared::ServerEvent::QueueLeft);
            }
            state.engine.shutdown().await;
        }
    }
    Ok(())
}
