//! HTTP surface over one certificate contract instance

pub mod certificates;
pub mod error;
pub mod health;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::issuance::IssuanceContract;
use crate::ledger::LedgerRuntime;

pub type SharedLedger = Arc<dyn LedgerRuntime>;

/// Header carrying the account that invokes a mutating operation
pub const CALLER_HEADER: &str = "x-caller-account";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Locked per invocation, so issuances against the instance run one at a time
    pub contract: Arc<Mutex<IssuanceContract<SharedLedger>>>,
    pub ledger: SharedLedger,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(contract: IssuanceContract<SharedLedger>, config: Config) -> Self {
        let ledger = Arc::clone(contract.ledger());
        Self {
            contract: Arc::new(Mutex::new(contract)),
            ledger,
            config: Arc::new(config),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/contract/admin", get(certificates::get_admin))
        .route("/contract/last-token-id", get(certificates::get_last_token_id))
        .route("/certificates", post(certificates::issue_certificate))
        .route("/certificates/:token_id", get(certificates::get_certificate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
