//! wirecall Server Binary
//!
//! Serves the demo `/echo` and `/reverse` objects over raw byte payloads.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};
use wirecall::network::Server;
use wirecall::pipeline::{CallInfo, RawFormatter, ServerPipeline, Services, TraceStage};
use wirecall::Config;

/// wirecall Server
#[derive(Parser, Debug)]
#[command(name = "wirecall-server")]
#[command(about = "Remote-call server with demo echo services")]
#[command(version)]
struct Args {
    /// Listen address (tcp://host:port or \\.\pipe\name)
    #[arg(short, long, default_value = "tcp://127.0.0.1:8085")]
    listen: String,

    /// Maximum concurrent dispatch workers
    #[arg(short = 'w', long, default_value = "32")]
    max_workers: usize,

    /// Maximum connections waiting for a worker
    #[arg(short = 'q', long, default_value = "256")]
    max_queued: usize,

    /// Spare workers required before idle connections are parked
    #[arg(long, default_value = "2")]
    min_free_workers: usize,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,wirecall=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("wirecall Server v{}", wirecall::VERSION);
    tracing::info!("Listen address: {}", args.listen);

    let config = Config::builder()
        .listen_addr(&args.listen)
        .max_workers(args.max_workers)
        .max_queued_requests(args.max_queued)
        .min_free_workers(args.min_free_workers)
        .build();

    let services = Services::<RawFormatter>::new()
        .with("/echo", |_: &CallInfo, body: Vec<u8>| -> wirecall::Result<Vec<u8>> { Ok(body) })
        .with("/reverse", |_: &CallInfo, mut body: Vec<u8>| -> wirecall::Result<Vec<u8>> {
            body.reverse();
            Ok(body)
        });

    let pipeline = ServerPipeline::new(RawFormatter::new(), services, config.max_payload_size)
        .with_stage(TraceStage);

    let server = match Server::bind(config, Arc::new(pipeline)) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };

    // Set up Ctrl+C handler
    let shutdown = server.shutdown_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        tracing::info!("Received Ctrl+C, initiating shutdown...");
        shutdown.shutdown();
    }) {
        tracing::warn!("Could not install Ctrl+C handler: {}", e);
    }

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}
