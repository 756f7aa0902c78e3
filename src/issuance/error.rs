use thiserror::Error;

use crate::ledger::{AccountIdentity, InstanceId, LedgerError};

pub type IssuanceResult<T> = Result<T, IssuanceError>;

#[derive(Debug, Error)]
pub enum IssuanceError {
    /// The caller is not the stored admin. No ledger step was attempted.
    #[error("Only admin can issue certificates (caller: {caller})")]
    Unauthorized { caller: AccountIdentity },

    /// The runtime rejected the group; none of its effects persisted.
    #[error("Ledger operation failed: {0}")]
    LedgerOperationFailed(#[source] LedgerError),

    #[error("Contract instance {instance} has not been initialized")]
    UninitializedAccess { instance: InstanceId },
}

impl IssuanceError {
    pub fn unauthorized(caller: &AccountIdentity) -> Self {
        Self::Unauthorized {
            caller: caller.clone(),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    pub fn ledger_error(&self) -> Option<&LedgerError> {
        match self {
            Self::LedgerOperationFailed(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LedgerError> for IssuanceError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::UnknownInstance { instance } => Self::UninitializedAccess {
                instance: InstanceId::new(instance),
            },
            other => Self::LedgerOperationFailed(other),
        }
    }
}
