use anyhow::Result;
use axum::Router;
use clap::Parser;
use pubsearch_core::EngineConfig;
use std::net::SocketAddr;
use tracing_subscriber::{fmt, EnvFilter};
use server::build_app;
use tokio::net::TcpListener;

#[derive(Parser)]
struct Args {
    /// Index directory path
    #[arg(long, default_value = "./index")]
    index: String,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// Minimum summed score for a document to be returned
    #[arg(long, default_value_t = 0.01)]
    min_score: f64,
    /// Hard cap on hits per query
    #[arg(long, default_value_t = 500)]
    max_results: usize,
    /// Query cache entries (0 disables the cache)
    #[arg(long, default_value_t = 100)]
    cache_capacity: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let config = EngineConfig {
        min_score_threshold: args.min_score,
        max_results: args.max_results,
        cache_capacity: args.cache_capacity,
    };
    let admin_token = std::env::var("ADMIN_TOKEN").ok();
    let app: Router = build_app(args.index.clone(), config, admin_token)?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
