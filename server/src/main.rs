use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use roomcast_server::config::RoomcastConfig;
use roomcast_server::engine::broker::RoomBroker;
use roomcast_server::web::app_state::AppState;
use roomcast_server::web::router::build_router;

#[derive(Parser)]
#[command(name = "roomcast-server", about = "Real-time room session broker")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "roomcast.toml")]
    config: String,

    /// Override the configured listen address.
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = RoomcastConfig::load(&args.config);
    if let Some(listen) = args.listen {
        config.server.listen_address = listen;
    }

    let broker = Arc::new(RoomBroker::new(config.to_broker_settings()));
    let app_state = Arc::new(AppState { broker });
    let app = build_router(app_state);

    info!("Roomcast broker starting on {}", config.server.listen_address);

    let listener = tokio::net::TcpListener::bind(&config.server.listen_address)
        .await
        .expect("failed to bind listener");

    axum::serve(listener, app).await.expect("server error");
}
