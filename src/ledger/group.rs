//! Atomic groups: the single command object a contract hands to a runtime.
//!
//! Steps in a group can refer to a unit created earlier in the same group
//! through [`TokenRef::Created`], because the runtime only assigns the id
//! while the group is being applied.

use crate::ledger::errors::{LedgerError, LedgerResult};
use crate::ledger::types::{AccountIdentity, InstanceId, TokenId};

/// Attributes of a unit fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitParams {
    pub total_supply: u64,
    pub decimals: u32,
    pub manager: AccountIdentity,
    pub freeze: AccountIdentity,
    pub clawback: AccountIdentity,
    pub url: String,
    pub name: String,
    pub unit_name: String,
}

/// Unit targeted by a registration or transfer step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRef {
    /// The n-th unit (zero based) created earlier in the same group.
    Created(usize),
    Existing(TokenId),
}

impl TokenRef {
    pub fn resolve(&self, created: &[TokenId]) -> LedgerResult<TokenId> {
        match *self {
            TokenRef::Existing(id) => Ok(id),
            TokenRef::Created(index) => {
                created
                    .get(index)
                    .copied()
                    .ok_or(LedgerError::UnresolvedUnitReference {
                        index,
                        created: created.len(),
                    })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupStep {
    CreateUnit(UnitParams),
    /// Zero-quantity transfer marking `holder` as willing to hold `token`.
    RegisterHolder {
        token: TokenRef,
        holder: AccountIdentity,
        quantity: u64,
    },
    /// Moves units from the group sender to `recipient`.
    TransferUnit {
        token: TokenRef,
        recipient: AccountIdentity,
        quantity: u64,
    },
}

impl GroupStep {
    pub fn kind(&self) -> &'static str {
        match self {
            GroupStep::CreateUnit(_) => "create_unit",
            GroupStep::RegisterHolder { .. } => "register_holder",
            GroupStep::TransferUnit { .. } => "transfer_unit",
        }
    }
}

/// Contract state write committed together with the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateWrite {
    pub instance: InstanceId,
    pub last_token_id: TokenRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtomicGroup {
    sender: AccountIdentity,
    steps: Vec<GroupStep>,
    state_write: Option<StateWrite>,
}

impl AtomicGroup {
    /// Opens a group whose fees and outgoing transfers are paid by `sender`.
    pub fn begin(sender: AccountIdentity) -> Self {
        Self {
            sender,
            steps: Vec::new(),
            state_write: None,
        }
    }

    pub fn create_unit(mut self, params: UnitParams) -> Self {
        self.steps.push(GroupStep::CreateUnit(params));
        self
    }

    pub fn register_holder(mut self, token: TokenRef, holder: AccountIdentity) -> Self {
        self.steps.push(GroupStep::RegisterHolder {
            token,
            holder,
            quantity: 0,
        });
        self
    }

    pub fn transfer_unit(
        mut self,
        token: TokenRef,
        recipient: AccountIdentity,
        quantity: u64,
    ) -> Self {
        self.steps.push(GroupStep::TransferUnit {
            token,
            recipient,
            quantity,
        });
        self
    }

    pub fn write_last_token_id(mut self, instance: InstanceId, token: TokenRef) -> Self {
        self.state_write = Some(StateWrite {
            instance,
            last_token_id: token,
        });
        self
    }

    pub fn sender(&self) -> &AccountIdentity {
        &self.sender
    }

    pub fn steps(&self) -> &[GroupStep] {
        &self.steps
    }

    pub fn state_write(&self) -> Option<&StateWrite> {
        self.state_write.as_ref()
    }

    /// Contract instance whose state this group writes, if any.
    pub fn instance(&self) -> Option<InstanceId> {
        self.state_write.map(|write| write.instance)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
