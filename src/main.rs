use anyhow::{anyhow, Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::prelude::*;

use certificate_minter::api::{self, AppState, SharedLedger};
use certificate_minter::config::{Config, LedgerBackend};
use certificate_minter::issuance::{CallerIdentity, IssuanceContract};
use certificate_minter::ledger::{InstanceId, MemoryLedger};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    init_tracing();

    let config = Config::from_env().context("Failed to load configuration")?;

    tracing::info!("Starting certificate minter");
    tracing::info!("Environment: {}", config.server.environment);
    tracing::info!("Ledger backend: {:?}", config.ledger.backend);

    let contract = match config.ledger.backend {
        LedgerBackend::Memory => {
            let ledger = Arc::new(MemoryLedger::new(config.ledger.params()));
            let contract = open_contract(ledger.clone(), &config).await?;
            ledger
                .fund(contract.app_account(), config.ledger.app_funding)
                .await
                .context("Failed to fund application account")?;
            contract
        }
        LedgerBackend::Postgres => open_postgres(&config).await?,
    };

    tracing::info!(
        "Serving contract instance {} (application account {})",
        contract.instance(),
        contract.app_account()
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("HOST and PORT must form a socket address")?;
    let app = api::router(AppState::new(contract, config));

    tracing::info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "certificate_minter=info,tower_http=info".into());

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Re-attach to the configured instance, or deploy a fresh one for the admin
async fn open_contract(
    ledger: SharedLedger,
    config: &Config,
) -> Result<IssuanceContract<SharedLedger>> {
    let contract = match config.ledger.instance_id {
        Some(id) => IssuanceContract::attach(ledger, InstanceId::new(id))
            .await
            .with_context(|| format!("Failed to attach to contract instance {}", id))?,
        None => {
            let admin = CallerIdentity::new(config.admin_account()?);
            IssuanceContract::initialize(ledger, &admin)
                .await
                .context("Failed to deploy contract instance")?
        }
    };
    Ok(contract)
}

#[cfg(feature = "database")]
async fn open_postgres(config: &Config) -> Result<IssuanceContract<SharedLedger>> {
    use certificate_minter::database::{self, PgLedger, PoolConfig};

    let url = config
        .ledger
        .database_url
        .as_deref()
        .ok_or_else(|| anyhow!("DATABASE_URL not set"))?;
    let pool = database::init_pool(
        url,
        Some(PoolConfig {
            max_connections: config.ledger.max_connections,
            ..PoolConfig::default()
        }),
    )
    .await?;
    database::migrate(&pool).await?;

    let ledger = Arc::new(PgLedger::new(pool, config.ledger.params()));
    let contract = open_contract(ledger.clone(), config).await?;

    // A re-attached instance keeps whatever balance it already has.
    if config.ledger.instance_id.is_none() {
        ledger
            .fund(contract.app_account(), config.ledger.app_funding)
            .await
            .context("Failed to fund application account")?;
    }
    Ok(contract)
}

#[cfg(not(feature = "database"))]
async fn open_postgres(_config: &Config) -> Result<IssuanceContract<SharedLedger>> {
    Err(anyhow!(
        "LEDGER_BACKEND=postgres requires building with the `database` feature"
    ))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}
