use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::issuance::error::{IssuanceError, IssuanceResult};
use crate::ledger::{AccountIdentity, GroupReceipt, LedgerError, StepReceipt, TokenId};

/// Display name of every certificate unit.
pub const CERTIFICATE_NAME: &str = "Certificate NFT";
/// Unit symbol of every certificate unit.
pub const CERTIFICATE_UNIT: &str = "CERT";

/// Authenticated identity of whoever invokes a contract operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallerIdentity(AccountIdentity);

impl CallerIdentity {
    pub fn new(account: AccountIdentity) -> Self {
        Self(account)
    }

    pub fn account(&self) -> &AccountIdentity {
        &self.0
    }
}

impl From<AccountIdentity> for CallerIdentity {
    fn from(account: AccountIdentity) -> Self {
        Self(account)
    }
}

/// A committed issuance: the new token and the receipts of its three steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issuance {
    pub token_id: TokenId,
    pub recipient: AccountIdentity,
    pub group_id: Uuid,
    pub creation_tx: String,
    pub registration_tx: String,
    pub transfer_tx: String,
    pub committed_at: DateTime<Utc>,
}

impl Issuance {
    /// Read the (created, registered, transferred) triple out of a receipt.
    pub fn from_receipt(receipt: GroupReceipt) -> IssuanceResult<Self> {
        match receipt.steps.as_slice() {
            [StepReceipt::Created {
                tx_id: creation_tx,
                token_id,
            }, StepReceipt::Registered {
                tx_id: registration_tx,
                ..
            }, StepReceipt::Transferred {
                tx_id: transfer_tx,
                to,
                ..
            }] => Ok(Self {
                token_id: *token_id,
                recipient: to.clone(),
                group_id: receipt.group_id,
                creation_tx: creation_tx.clone(),
                registration_tx: registration_tx.clone(),
                transfer_tx: transfer_tx.clone(),
                committed_at: receipt.committed_at,
            }),
            steps => Err(IssuanceError::LedgerOperationFailed(LedgerError::storage(
                format!(
                    "group {} returned {} receipts that do not match an issuance",
                    receipt.group_id,
                    steps.len()
                ),
            ))),
        }
    }
}
