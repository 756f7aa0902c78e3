use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::AppState;
use crate::config::LedgerBackend;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub environment: String,
    pub ledger_backend: LedgerBackend,
    pub ledger_reachable: bool,
    pub contract_instance: u64,
}

/// Reports 503 while the ledger's backing store does not answer.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let version = env!("CARGO_PKG_VERSION").to_string();
    let contract_instance = state.contract.lock().await.instance().value();

    let ledger_reachable = match state.ledger.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!("Ledger health check failed: {}", e);
            false
        }
    };
    let (status, label) = if ledger_reachable {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    let response = HealthResponse {
        status: label.to_string(),
        version,
        environment: state.config.server.environment.clone(),
        ledger_backend: state.config.ledger.backend,
        ledger_reachable,
        contract_instance,
    };

    (status, Json(response))
}
