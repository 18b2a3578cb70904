use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use ethers_core::types::H256;
use relay_core::ChainId;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;

use crate::metrics::RelayerMetrics;

#[derive(Debug, Clone, Serialize)]
struct MonitorEvent {
    block_number: u64,
    block_hash: H256,
    timestamp: u64,
}

#[derive(Debug, Clone, Default)]
struct WorkerStatus {
    active: bool,
    monitor: Option<MonitorEvent>,
}

/// Tracks per-chain liveness and the latest observed block, the state behind the `/status`
/// endpoint's periodic `{activeWorkers, inactiveWorkers}` and `monitor` notifications
/// (spec.md §6 "Status endpoint").
#[derive(Default)]
pub struct StatusBoard {
    workers: RwLock<HashMap<ChainId, WorkerStatus>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn mark_active(&self, chain: ChainId) {
        self.workers.write().await.entry(chain).or_default().active = true;
    }

    pub async fn mark_inactive(&self, chain: ChainId) {
        self.workers.write().await.entry(chain).or_default().active = false;
    }

    pub async fn record_monitor(&self, chain: ChainId, block_number: u64, block_hash: H256, timestamp: u64) {
        let mut workers = self.workers.write().await;
        let entry = workers.entry(chain).or_default();
        entry.active = true;
        entry.monitor = Some(MonitorEvent {
            block_number,
            block_hash,
            timestamp,
        });
    }

    async fn snapshot(&self) -> StatusSnapshot {
        let workers = self.workers.read().await;
        let mut active_workers = Vec::new();
        let mut inactive_workers = Vec::new();
        let mut monitor = HashMap::new();
        for (chain, status) in workers.iter() {
            if status.active {
                active_workers.push(chain.0);
            } else {
                inactive_workers.push(chain.0);
            }
            if let Some(event) = &status.monitor {
                monitor.insert(chain.0.to_string(), event.clone());
            }
        }
        active_workers.sort_unstable();
        inactive_workers.sort_unstable();
        StatusSnapshot {
            active_workers,
            inactive_workers,
            monitor,
        }
    }
}

#[derive(Serialize)]
struct StatusSnapshot {
    #[serde(rename = "activeWorkers")]
    active_workers: Vec<u32>,
    #[serde(rename = "inactiveWorkers")]
    inactive_workers: Vec<u32>,
    monitor: HashMap<String, MonitorEvent>,
}

struct AppState {
    board: Arc<StatusBoard>,
    metrics: Arc<RelayerMetrics>,
}

async fn status_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.board.snapshot().await)
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.gather() {
        Ok(body) => ([("content-type", "text/plain; charset=utf-8")], body).into_response(),
        Err(err) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

/// Serves `/status` and `/metrics` on `PORT` (spec.md §6 "Status endpoint" + SPEC_FULL.md
/// §2.5), mirroring the teacher's `hyperlane-base::server::Server`.
pub async fn serve(port: u16, board: Arc<StatusBoard>, metrics: Arc<RelayerMetrics>) -> std::io::Result<()> {
    let state = Arc::new(AppState { board, metrics });
    let app = Router::new()
        .route("/status", get(status_handler))
        .route("/metrics", get(metrics_handler))
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting status/metrics server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}
