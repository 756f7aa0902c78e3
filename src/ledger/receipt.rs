use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::ledger::types::{AccountIdentity, TokenId};

/// Outcome of one committed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepReceipt {
    Created {
        tx_id: String,
        token_id: TokenId,
    },
    Registered {
        tx_id: String,
        token_id: TokenId,
        holder: AccountIdentity,
    },
    Transferred {
        tx_id: String,
        token_id: TokenId,
        from: AccountIdentity,
        to: AccountIdentity,
        quantity: u64,
    },
}

impl StepReceipt {
    pub fn tx_id(&self) -> &str {
        match self {
            StepReceipt::Created { tx_id, .. }
            | StepReceipt::Registered { tx_id, .. }
            | StepReceipt::Transferred { tx_id, .. } => tx_id,
        }
    }

    pub fn token_id(&self) -> TokenId {
        match self {
            StepReceipt::Created { token_id, .. }
            | StepReceipt::Registered { token_id, .. }
            | StepReceipt::Transferred { token_id, .. } => *token_id,
        }
    }
}

/// Proof that every step of a group was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupReceipt {
    pub group_id: Uuid,
    pub steps: Vec<StepReceipt>,
    pub committed_at: DateTime<Utc>,
}

impl GroupReceipt {
    pub fn created_units(&self) -> Vec<TokenId> {
        self.steps
            .iter()
            .filter_map(|step| match step {
                StepReceipt::Created { token_id, .. } => Some(*token_id),
                _ => None,
            })
            .collect()
    }
}

/// Transaction id of a step: hex SHA-256 over the group id, position and kind.
pub fn step_tx_id(group_id: &Uuid, index: usize, kind: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(group_id.as_bytes());
    hasher.update((index as u64).to_be_bytes());
    hasher.update(kind.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_tx_ids_are_distinct_within_a_group() {
        let group_id = Uuid::new_v4();
        let create = step_tx_id(&group_id, 0, "create_unit");
        let register = step_tx_id(&group_id, 1, "register_holder");

        assert_eq!(create.len(), 64);
        assert_ne!(create, register);
        assert_eq!(create, step_tx_id(&group_id, 0, "create_unit"));
    }

    #[test]
    fn test_created_units_lists_only_creations() {
        let holder = AccountIdentity::new("R").unwrap();
        let receipt = GroupReceipt {
            group_id: Uuid::new_v4(),
            steps: vec![
                StepReceipt::Created {
                    tx_id: "a".into(),
                    token_id: TokenId::new(5),
                },
                StepReceipt::Registered {
                    tx_id: "b".into(),
                    token_id: TokenId::new(5),
                    holder,
                },
            ],
            committed_at: Utc::now(),
        };
        assert_eq!(receipt.created_units(), vec![TokenId::new(5)]);
    }
}
