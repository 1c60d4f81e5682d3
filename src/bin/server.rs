//! indexsync server binary (§10.5 "Process bootstrap").
//!
//! Loads configuration, installs the tracing subscriber, wires the pipeline
//! collaborators, runs the Index Manager's eager initialization, spawns the
//! Update Handler's worker pool, and exposes the delta-ingestion HTTP surface.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use indexsync::model::DeltaMessage;
use indexsync::{config::Config, logging, Pipeline};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "indexsync-server", about = "Delta-driven search index maintenance service")]
struct Args {
    /// Path to a config.toml file. Falls back to `Config::load()`'s default
    /// search path, then to `Config::default()`, if omitted.
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(path).unwrap_or_else(|e| {
            eprintln!("failed to load config from {path}: {e}");
            std::process::exit(1);
        }),
        None => Config::load().unwrap_or_else(|_| Config::default()),
    };

    if let Err(e) = logging::init(&config.logging) {
        eprintln!("failed to initialize logging: {e}");
    }

    info!(bind_address = %config.server.bind_address, "starting indexsync server");

    let pipeline = Arc::new(Pipeline::from_config(config));

    if let Err(e) = pipeline.initialize().await {
        error!(error = %e, "index manager initialization failed");
        std::process::exit(1);
    }
    info!("index manager initialized");

    pipeline.spawn_workers();
    info!(workers = pipeline.config.indexing.worker_count, "update handler workers started");

    let bind_address = pipeline.config.server.bind_address.clone();
    let max_delta_body_bytes = pipeline.config.server.max_delta_body_bytes;
    let app = Router::new()
        .route("/delta", post(handle_delta))
        .route("/healthz", get(handle_healthz))
        .with_state(pipeline)
        .layer(RequestBodyLimitLayer::new(max_delta_body_bytes))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any));

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {bind_address}: {e}"));
    info!(address = %bind_address, "listening");

    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "server error");
    }
}

/// `POST /delta`: accepts a §6 delta message and forwards it to the Delta
/// Router. A non-array payload is rejected with an error log and no state
/// change (§6, §8 "Boundary behaviors").
async fn handle_delta(State(pipeline): State<Arc<Pipeline>>, body: String) -> StatusCode {
    let delta: DeltaMessage = match serde_json::from_str(&body) {
        Ok(d) => d,
        Err(e) => {
            error!(error = %e, "rejected malformed delta payload");
            return StatusCode::BAD_REQUEST;
        }
    };
    pipeline.ingest_delta(&delta).await;
    StatusCode::ACCEPTED
}

async fn handle_healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
