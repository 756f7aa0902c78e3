use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use crate::ledger::{AccountIdentity, LedgerParams};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub ledger: LedgerConfig,
    pub issuer: IssuerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    Memory,
    Postgres,
}

impl FromStr for LedgerBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "postgres" => Ok(Self::Postgres),
            other => Err(anyhow!(
                "LEDGER_BACKEND must be 'memory' or 'postgres', got {}",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    pub backend: LedgerBackend,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub step_fee: u64,
    pub max_holdings: usize,
    /// Amount credited to the contract's application account at startup
    pub app_funding: u64,
    /// Existing instance to re-attach to instead of deploying a new one
    pub instance_id: Option<u64>,
}

impl LedgerConfig {
    pub fn params(&self) -> LedgerParams {
        LedgerParams {
            step_fee: self.step_fee,
            max_holdings_per_account: self.max_holdings,
            ..LedgerParams::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssuerConfig {
    pub admin_account: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let server = ServerConfig {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "PORT", 8000)?,
            environment: lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
        };

        let defaults = LedgerParams::default();
        let ledger = LedgerConfig {
            backend: lookup("LEDGER_BACKEND")
                .unwrap_or_else(|| "memory".to_string())
                .parse()?,
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 20)?,
            step_fee: parse_or(&lookup, "LEDGER_STEP_FEE", defaults.step_fee)?,
            max_holdings: parse_or(
                &lookup,
                "LEDGER_MAX_HOLDINGS",
                defaults.max_holdings_per_account,
            )?,
            app_funding: parse_or(&lookup, "LEDGER_APP_FUNDING", 1_000_000)?,
            instance_id: lookup("CONTRACT_INSTANCE_ID")
                .map(|v| {
                    v.parse()
                        .context("CONTRACT_INSTANCE_ID must be a valid number")
                })
                .transpose()?,
        };

        let issuer = IssuerConfig {
            admin_account: lookup("ADMIN_ACCOUNT").context("ADMIN_ACCOUNT not set")?,
        };

        let config = Config {
            server,
            ledger,
            issuer,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        // Validate port range
        if self.server.port < 1024 {
            return Err(anyhow!(
                "Port must be at least 1024, got {}",
                self.server.port
            ));
        }

        // Validate environment
        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&self.server.environment.as_str()) {
            return Err(anyhow!(
                "Environment must be one of: {:?}, got {}",
                valid_environments,
                self.server.environment
            ));
        }

        if self.ledger.backend == LedgerBackend::Postgres && self.ledger.database_url.is_none() {
            return Err(anyhow!(
                "DATABASE_URL is required when LEDGER_BACKEND is postgres"
            ));
        }

        if self.ledger.max_connections == 0 {
            return Err(anyhow!("DATABASE_MAX_CONNECTIONS must be greater than 0"));
        }

        if self.ledger.max_holdings == 0 {
            return Err(anyhow!("LEDGER_MAX_HOLDINGS must be greater than 0"));
        }

        AccountIdentity::new(&self.issuer.admin_account)
            .map_err(|e| anyhow!("ADMIN_ACCOUNT is invalid: {}", e))?;

        Ok(())
    }

    pub fn admin_account(&self) -> Result<AccountIdentity> {
        AccountIdentity::new(&self.issuer.admin_account)
            .map_err(|e| anyhow!("ADMIN_ACCOUNT is invalid: {}", e))
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid number", key)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_to_memory_backend() {
        let config = config_from(&[("ADMIN_ACCOUNT", "ADMIN")]).unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.ledger.backend, LedgerBackend::Memory);
        assert_eq!(config.ledger.params(), LedgerParams::default());
        assert!(config.ledger.instance_id.is_none());
    }

    #[test]
    fn test_admin_account_is_required() {
        let err = config_from(&[]).unwrap_err();
        assert!(err.to_string().contains("ADMIN_ACCOUNT"));

        assert!(config_from(&[("ADMIN_ACCOUNT", "   ")]).is_err());
    }

    #[test]
    fn test_postgres_backend_requires_database_url() {
        let err = config_from(&[("ADMIN_ACCOUNT", "ADMIN"), ("LEDGER_BACKEND", "postgres")])
            .unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));

        let config = config_from(&[
            ("ADMIN_ACCOUNT", "ADMIN"),
            ("LEDGER_BACKEND", "Postgres"),
            ("DATABASE_URL", "postgres://localhost/ledger"),
        ])
        .unwrap();
        assert_eq!(config.ledger.backend, LedgerBackend::Postgres);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(config_from(&[("ADMIN_ACCOUNT", "ADMIN"), ("PORT", "80")]).is_err());
        assert!(config_from(&[("ADMIN_ACCOUNT", "ADMIN"), ("PORT", "http")]).is_err());
        assert!(config_from(&[("ADMIN_ACCOUNT", "ADMIN"), ("ENVIRONMENT", "qa")]).is_err());
        assert!(config_from(&[("ADMIN_ACCOUNT", "ADMIN"), ("LEDGER_BACKEND", "sqlite")]).is_err());
        assert!(config_from(&[("ADMIN_ACCOUNT", "ADMIN"), ("LEDGER_MAX_HOLDINGS", "0")]).is_err());
    }

    #[test]
    fn test_ledger_overrides() {
        let config = config_from(&[
            ("ADMIN_ACCOUNT", "ADMIN"),
            ("LEDGER_STEP_FEE", "0"),
            ("LEDGER_MAX_HOLDINGS", "5"),
            ("CONTRACT_INSTANCE_ID", "7"),
        ])
        .unwrap();

        let params = config.ledger.params();
        assert_eq!(params.step_fee, 0);
        assert_eq!(params.max_holdings_per_account, 5);
        assert_eq!(config.ledger.instance_id, Some(7));
    }
}
