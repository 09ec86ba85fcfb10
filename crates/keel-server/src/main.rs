//! keel-server binary.

use clap::Parser;
use keel_server::{create_router, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Smart-HTTP server for Keel repositories.
#[derive(Parser, Debug)]
#[command(name = "keel-server", version, about)]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:8080")]
    addr: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!("keel={level},tower_http=debug", level = args.log_level).into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let router = create_router(AppState::new());
    let listener = tokio::net::TcpListener::bind(&args.addr).await?;
    tracing::info!(addr = %args.addr, "keel-server listening");
    axum::serve(listener, router).await
}
