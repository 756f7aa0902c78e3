//! Ledger runtime trait definitions
//!
//! The issuance contract drives every ledger effect through this interface.

use async_trait::async_trait;
use std::sync::Arc;

use crate::issuance::ContractState;
use crate::ledger::errors::LedgerResult;
use crate::ledger::group::AtomicGroup;
use crate::ledger::receipt::GroupReceipt;
use crate::ledger::types::{AccountIdentity, Deployment, InstanceId, TokenId, UnitRecord};

/// Hosting runtime for contract instances.
///
/// Implementations serialize all operations against a given instance and
/// apply each [`AtomicGroup`] entirely or not at all.
#[async_trait]
pub trait LedgerRuntime: Send + Sync {
    /// Creation hook: opens a new instance whose admin is `creator`.
    ///
    /// The runtime persists the initial [`ContractState`] and opens the
    /// instance's application account. It runs exactly once per instance.
    async fn deploy(&self, creator: &AccountIdentity) -> LedgerResult<Deployment>;

    /// Load the durable state of a deployed instance.
    ///
    /// # Returns
    /// * `LedgerError::UnknownInstance` when the instance was never deployed
    async fn load_state(&self, instance: InstanceId) -> LedgerResult<ContractState>;

    /// Apply every step of `group`, plus its state write, as one commit.
    ///
    /// On any rejected step nothing the group did is observable afterwards,
    /// including units it created.
    async fn submit_group(&self, group: AtomicGroup) -> LedgerResult<GroupReceipt>;

    async fn unit(&self, token: TokenId) -> LedgerResult<Option<UnitRecord>>;

    /// Units of `token` held by `account`; `None` when it never registered.
    async fn holding(&self, account: &AccountIdentity, token: TokenId)
        -> LedgerResult<Option<u64>>;

    /// Accounts currently holding a non-zero quantity of `token`.
    async fn holders(&self, token: TokenId) -> LedgerResult<Vec<(AccountIdentity, u64)>>;

    /// Check that the backing store answers.
    async fn ping(&self) -> LedgerResult<()>;
}

#[async_trait]
impl<T: LedgerRuntime + ?Sized> LedgerRuntime for Arc<T> {
    async fn deploy(&self, creator: &AccountIdentity) -> LedgerResult<Deployment> {
        (**self).deploy(creator).await
    }

    async fn load_state(&self, instance: InstanceId) -> LedgerResult<ContractState> {
        (**self).load_state(instance).await
    }

    async fn submit_group(&self, group: AtomicGroup) -> LedgerResult<GroupReceipt> {
        (**self).submit_group(group).await
    }

    async fn unit(&self, token: TokenId) -> LedgerResult<Option<UnitRecord>> {
        (**self).unit(token).await
    }

    async fn holding(
        &self,
        account: &AccountIdentity,
        token: TokenId,
    ) -> LedgerResult<Option<u64>> {
        (**self).holding(account, token).await
    }

    async fn holders(&self, token: TokenId) -> LedgerResult<Vec<(AccountIdentity, u64)>> {
        (**self).holders(token).await
    }

    async fn ping(&self) -> LedgerResult<()> {
        (**self).ping().await
    }
}
