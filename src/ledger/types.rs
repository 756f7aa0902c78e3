//! Identities and records shared by every ledger runtime.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::issuance::ContractState;
use crate::ledger::errors::{LedgerError, LedgerResult};
use crate::ledger::group::UnitParams;

/// Longest account identity a runtime accepts.
pub const MAX_ACCOUNT_LEN: usize = 64;

/// Prefix of the account owned by a deployed contract instance.
const APPLICATION_PREFIX: &str = "app:";

/// Address of a ledger account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountIdentity(String);

impl AccountIdentity {
    pub fn new(address: impl AsRef<str>) -> LedgerResult<Self> {
        let address = address.as_ref().trim();

        if address.is_empty() {
            return Err(LedgerError::invalid_parameter(
                "account",
                "address cannot be empty",
            ));
        }
        if address.len() > MAX_ACCOUNT_LEN {
            return Err(LedgerError::invalid_parameter(
                "account",
                format!("address exceeds {} bytes", MAX_ACCOUNT_LEN),
            ));
        }
        if address.chars().any(char::is_whitespace) {
            return Err(LedgerError::invalid_parameter(
                "account",
                "address cannot contain whitespace",
            ));
        }

        Ok(Self(address.to_string()))
    }

    /// The account a runtime opens for a contract instance at deployment.
    pub fn application(instance: InstanceId) -> Self {
        Self(format!("{}{}", APPLICATION_PREFIX, instance.value()))
    }

    pub fn is_application(&self) -> bool {
        self.0.starts_with(APPLICATION_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AccountIdentity {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for AccountIdentity {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AccountIdentity> for String {
    fn from(account: AccountIdentity) -> Self {
        account.0
    }
}

/// Runtime-assigned identifier of a non-fungible unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(u64);

impl TokenId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TokenId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Identifier of a deployed contract instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(u64);

impl InstanceId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of the runtime's creation hook for a contract instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub instance: InstanceId,
    pub app_account: AccountIdentity,
    pub state: ContractState,
}

/// A unit as the ledger stores it after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub token_id: TokenId,
    pub creator: AccountIdentity,
    pub total_supply: u64,
    pub decimals: u32,
    pub manager: AccountIdentity,
    pub freeze: AccountIdentity,
    pub clawback: AccountIdentity,
    pub url: String,
    pub name: String,
    pub unit_name: String,
}

impl UnitRecord {
    pub fn from_params(token_id: TokenId, creator: AccountIdentity, params: &UnitParams) -> Self {
        Self {
            token_id,
            creator,
            total_supply: params.total_supply,
            decimals: params.decimals,
            manager: params.manager.clone(),
            freeze: params.freeze.clone(),
            clawback: params.clawback.clone(),
            url: params.url.clone(),
            name: params.name.clone(),
            unit_name: params.unit_name.clone(),
        }
    }
}
