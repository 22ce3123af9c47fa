use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use tokio::net::TcpListener;

use carbon_pool::{config::Config, ingest, readapi, Log};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the carbon-pool config file.
    #[arg(short, long, default_value = "/etc/carbon-pool.conf")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let cfg = Config::from_file(&args.config)
        .with_context(|| format!("loading config from {}", args.config.display()))?;

    info!("data dir: {}", cfg.data_dir.display());
    info!(
        "segment size: {} bytes, max segments: {}",
        cfg.segment_size, cfg.max_segments
    );

    let store = Arc::new(
        Log::open(&cfg.data_dir, cfg.segment_size, cfg.max_segments)
            .context("opening log directory")?,
    );

    let ingest_listener = TcpListener::bind(cfg.ingest_addr)
        .await
        .with_context(|| format!("binding ingest address {}", cfg.ingest_addr))?;
    info!("ingest listening on {}", cfg.ingest_addr);

    let api_listener = TcpListener::bind(cfg.api_addr)
        .await
        .with_context(|| format!("binding read API address {}", cfg.api_addr))?;
    info!("read API listening on {}", cfg.api_addr);

    let ingest_store = Arc::clone(&store);
    let ingest_task = tokio::spawn(async move {
        ingest::serve(ingest_store, ingest_listener, ingest::DEFAULT_MAX_BLOCK_SIZE).await
    });

    let api_store = Arc::clone(&store);
    let api_task = tokio::spawn(async move {
        axum::serve(api_listener, readapi::router(api_store).into_make_service())
            .await
            .context("read API server failed")
    });

    let result = tokio::select! {
        res = ingest_task => {
            res.context("ingest task panicked")?.context("ingest server failed")
        }
        res = api_task => {
            res.context("read API task panicked")?
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received");
            Ok(())
        }
    };

    store.close().context("closing log")?;
    result
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
