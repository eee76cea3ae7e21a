//! Liveness and readiness probes

use crate::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::time::Instant;

#[derive(Serialize)]
pub struct Liveness {
    pub status: &'static str,
    pub version: &'static str,
}

/// Store reachability as seen by the readiness probe
#[derive(Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StoreState {
    Up { latency_ms: u64 },
    Down { error: String },
}

#[derive(Serialize)]
pub struct Readiness {
    pub status: &'static str,
    pub store: StoreState,
}

/// Always healthy while the process serves requests
pub async fn health() -> Json<Liveness> {
    Json(Liveness {
        status: "healthy",
        version: peerdesk_common::VERSION,
    })
}

/// Ready once the paper store answers a ping
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Readiness>) {
    let started = Instant::now();

    match state.workflow.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(Readiness {
                status: "ready",
                store: StoreState::Up {
                    latency_ms: started.elapsed().as_millis() as u64,
                },
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(Readiness {
                    status: "not_ready",
                    store: StoreState::Down {
                        error: e.to_string(),
                    },
                }),
            )
        }
    }
}
