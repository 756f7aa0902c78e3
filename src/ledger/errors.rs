use thiserror::Error;

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Rejections raised by a ledger runtime while applying an atomic group.
///
/// Any of these aborts the whole group; the runtime guarantees none of the
/// group's effects persist.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Insufficient fee balance for {account}: available {available}, required {required}")]
    InsufficientFee {
        account: String,
        available: u64,
        required: u64,
    },

    #[error("Account {account} reached its holding limit of {limit} units")]
    HoldingLimitReached { account: String, limit: usize },

    #[error("Account {account} has not registered to hold unit {token_id}")]
    NotRegistered { account: String, token_id: u64 },

    #[error("Account {account} holds {available} of unit {token_id}, {required} required")]
    InsufficientUnits {
        account: String,
        token_id: u64,
        available: u64,
        required: u64,
    },

    #[error("Unit {token_id} does not exist")]
    UnknownUnit { token_id: u64 },

    #[error("Step references unit #{index} of this group, but only {created} were created so far")]
    UnresolvedUnitReference { index: usize, created: usize },

    #[error("Invalid {field}: {message}")]
    InvalidParameter { field: String, message: String },

    #[error("Contract instance {instance} does not exist")]
    UnknownInstance { instance: u64 },

    #[error("Atomic group contains no steps")]
    EmptyGroup,

    /// Backing store failure; `retryable` when the store was only unreachable.
    #[error("Ledger storage error: {message}")]
    Storage { message: String, retryable: bool },
}

impl LedgerError {
    pub fn insufficient_fee(account: impl ToString, available: u64, required: u64) -> Self {
        Self::InsufficientFee {
            account: account.to_string(),
            available,
            required,
        }
    }

    pub fn holding_limit_reached(account: impl ToString, limit: usize) -> Self {
        Self::HoldingLimitReached {
            account: account.to_string(),
            limit,
        }
    }

    pub fn not_registered(account: impl ToString, token_id: u64) -> Self {
        Self::NotRegistered {
            account: account.to_string(),
            token_id,
        }
    }

    pub fn insufficient_units(
        account: impl ToString,
        token_id: u64,
        available: u64,
        required: u64,
    ) -> Self {
        Self::InsufficientUnits {
            account: account.to_string(),
            token_id,
            available,
            required,
        }
    }

    pub fn unknown_unit(token_id: u64) -> Self {
        Self::UnknownUnit { token_id }
    }

    pub fn invalid_parameter(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn unknown_instance(instance: u64) -> Self {
        Self::UnknownInstance { instance }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            retryable: true,
        }
    }

    /// True only for storage failures the store reported as transient.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage { retryable: true, .. })
    }
}
