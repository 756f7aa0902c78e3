use serde::{Deserialize, Serialize};

use crate::ledger::{AccountIdentity, TokenId};

/// Durable state of one contract instance.
///
/// `last_token_id` is `None` until the first issuance, so a unit the runtime
/// numbered 0 is still distinguishable from "never issued".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractState {
    admin: AccountIdentity,
    last_token_id: Option<TokenId>,
}

impl ContractState {
    pub fn new(admin: AccountIdentity) -> Self {
        Self {
            admin,
            last_token_id: None,
        }
    }

    /// Rebuild state read back from a runtime's storage.
    pub fn restore(admin: AccountIdentity, last_token_id: Option<TokenId>) -> Self {
        Self {
            admin,
            last_token_id,
        }
    }

    pub fn admin(&self) -> &AccountIdentity {
        &self.admin
    }

    /// Most recent token id, reading `0` before any issuance.
    pub fn last_token_id(&self) -> TokenId {
        self.last_token_id.unwrap_or_default()
    }

    pub fn last_issued(&self) -> Option<TokenId> {
        self.last_token_id
    }

    pub fn has_issued(&self) -> bool {
        self.last_token_id.is_some()
    }

    pub(crate) fn record_issuance(&mut self, token_id: TokenId) {
        self.last_token_id = Some(token_id);
    }
}
