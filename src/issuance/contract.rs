//! The certificate issuance contract.

use tracing::{error, info, warn};

use crate::issuance::error::{IssuanceError, IssuanceResult};
use crate::issuance::state::ContractState;
use crate::issuance::types::{CallerIdentity, Issuance, CERTIFICATE_NAME, CERTIFICATE_UNIT};
use crate::ledger::{
    AccountIdentity, AtomicGroup, InstanceId, LedgerRuntime, TokenId, TokenRef, UnitParams,
};

/// One deployed issuer of certificate units.
///
/// Mutating operations take `&mut self`, so invocations against an instance
/// are serialized by whoever owns it.
pub struct IssuanceContract<L> {
    ledger: L,
    instance: InstanceId,
    app_account: AccountIdentity,
    state: ContractState,
}

impl<L: LedgerRuntime> IssuanceContract<L> {
    /// Deploy a new instance; the deploying caller becomes its admin.
    ///
    /// This is the only constructor for a fresh instance, so initialization
    /// happens exactly once, at creation.
    pub async fn initialize(ledger: L, caller: &CallerIdentity) -> IssuanceResult<Self> {
        let deployment = ledger.deploy(caller.account()).await?;

        info!(
            "Certificate contract {} initialized with admin {}",
            deployment.instance,
            deployment.state.admin()
        );

        Ok(Self {
            ledger,
            instance: deployment.instance,
            app_account: deployment.app_account,
            state: deployment.state,
        })
    }

    /// Reconnect to an instance deployed earlier.
    ///
    /// # Returns
    /// * `IssuanceError::UninitializedAccess` when the runtime has no such instance
    pub async fn attach(ledger: L, instance: InstanceId) -> IssuanceResult<Self> {
        let state = ledger.load_state(instance).await?;

        info!(
            "Attached to certificate contract {} (admin {}, last token {})",
            instance,
            state.admin(),
            state.last_token_id()
        );

        Ok(Self {
            ledger,
            instance,
            app_account: AccountIdentity::application(instance),
            state,
        })
    }

    /// Mint a certificate for `recipient` and hand it over in one atomic group.
    pub async fn issue(
        &mut self,
        caller: &CallerIdentity,
        recipient: &AccountIdentity,
        reference: &str,
    ) -> IssuanceResult<TokenId> {
        Ok(self
            .issue_with_receipt(caller, recipient, reference)
            .await?
            .token_id)
    }

    /// Like [`Self::issue`], returning the committed group's transaction ids.
    pub async fn issue_with_receipt(
        &mut self,
        caller: &CallerIdentity,
        recipient: &AccountIdentity,
        reference: &str,
    ) -> IssuanceResult<Issuance> {
        self.authorize(caller)?;

        let group = self.issuance_group(recipient, reference);
        let receipt = self.ledger.submit_group(group).await.map_err(|e| {
            error!(
                "Issuance to {} on contract {} failed: {}",
                recipient, self.instance, e
            );
            IssuanceError::from(e)
        })?;

        // The group is committed at this point, including its state write.
        if let Some(token_id) = receipt.created_units().first() {
            self.state.record_issuance(*token_id);
        }
        let issuance = Issuance::from_receipt(receipt)?;

        info!(
            "Issued certificate {} to {} (group {})",
            issuance.token_id, recipient, issuance.group_id
        );
        Ok(issuance)
    }

    /// Account allowed to issue on this instance.
    pub fn get_admin(&self) -> &AccountIdentity {
        self.state.admin()
    }

    /// Reads `0` before the first issuance; see [`Self::last_issued`].
    pub fn get_last_token_id(&self) -> TokenId {
        self.state.last_token_id()
    }

    /// Most recently issued token, `None` before the first issuance.
    pub fn last_issued(&self) -> Option<TokenId> {
        self.state.last_issued()
    }

    pub fn state(&self) -> &ContractState {
        &self.state
    }

    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    pub fn app_account(&self) -> &AccountIdentity {
        &self.app_account
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    fn authorize(&self, caller: &CallerIdentity) -> IssuanceResult<()> {
        if caller.account() != self.state.admin() {
            warn!(
                "Rejected issuance on contract {}: {} is not the admin",
                self.instance,
                caller.account()
            );
            return Err(IssuanceError::unauthorized(caller.account()));
        }
        Ok(())
    }

    fn issuance_group(&self, recipient: &AccountIdentity, reference: &str) -> AtomicGroup {
        let admin = self.state.admin();
        let unit = UnitParams {
            total_supply: 1,
            decimals: 0,
            manager: admin.clone(),
            freeze: admin.clone(),
            clawback: admin.clone(),
            url: reference.to_string(),
            name: CERTIFICATE_NAME.to_string(),
            unit_name: CERTIFICATE_UNIT.to_string(),
        };

        AtomicGroup::begin(self.app_account.clone())
            .create_unit(unit)
            .register_holder(TokenRef::Created(0), recipient.clone())
            .transfer_unit(TokenRef::Created(0), recipient.clone(), 1)
            .write_last_token_id(self.instance, TokenRef::Created(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issuance::ContractState;
    use crate::ledger::{
        Deployment, GroupReceipt, GroupStep, LedgerError, LedgerParams, LedgerResult, MemoryLedger,
        UnitRecord,
    };
    use async_trait::async_trait;
    use std::sync::Arc;

    /// Commits groups normally but hands back a receipt missing its last step.
    struct TruncatingLedger(MemoryLedger);

    #[async_trait]
    impl LedgerRuntime for TruncatingLedger {
        async fn deploy(&self, creator: &AccountIdentity) -> LedgerResult<Deployment> {
            self.0.deploy(creator).await
        }

        async fn load_state(&self, instance: InstanceId) -> LedgerResult<ContractState> {
            self.0.load_state(instance).await
        }

        async fn submit_group(&self, group: AtomicGroup) -> LedgerResult<GroupReceipt> {
            let mut receipt = self.0.submit_group(group).await?;
            receipt.steps.pop();
            Ok(receipt)
        }

        async fn unit(&self, token: TokenId) -> LedgerResult<Option<UnitRecord>> {
            self.0.unit(token).await
        }

        async fn holding(
            &self,
            account: &AccountIdentity,
            token: TokenId,
        ) -> LedgerResult<Option<u64>> {
            self.0.holding(account, token).await
        }

        async fn holders(&self, token: TokenId) -> LedgerResult<Vec<(AccountIdentity, u64)>> {
            self.0.holders(token).await
        }

        async fn ping(&self) -> LedgerResult<()> {
            self.0.ping().await
        }
    }

    fn account(name: &str) -> AccountIdentity {
        AccountIdentity::new(name).unwrap()
    }

    async fn deploy(admin: &str) -> IssuanceContract<Arc<MemoryLedger>> {
        let ledger = Arc::new(MemoryLedger::new(LedgerParams::feeless()));
        IssuanceContract::initialize(ledger, &CallerIdentity::new(account(admin)))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_issuance_group_shape() {
        let contract = deploy("ADMIN").await;
        let recipient = account("STUDENT");
        let group = contract.issuance_group(&recipient, "https://example.org/cert/1");

        assert_eq!(group.sender(), contract.app_account());
        assert_eq!(group.len(), 3);

        match &group.steps()[0] {
            GroupStep::CreateUnit(unit) => {
                assert_eq!(unit.total_supply, 1);
                assert_eq!(unit.decimals, 0);
                assert_eq!(unit.name, CERTIFICATE_NAME);
                assert_eq!(unit.unit_name, CERTIFICATE_UNIT);
                assert_eq!(unit.url, "https://example.org/cert/1");
                assert_eq!(&unit.manager, contract.get_admin());
                assert_eq!(&unit.freeze, contract.get_admin());
                assert_eq!(&unit.clawback, contract.get_admin());
            }
            other => panic!("expected unit creation, got {:?}", other),
        }
        assert_eq!(
            group.steps()[1],
            GroupStep::RegisterHolder {
                token: TokenRef::Created(0),
                holder: recipient.clone(),
                quantity: 0,
            }
        );
        assert_eq!(
            group.steps()[2],
            GroupStep::TransferUnit {
                token: TokenRef::Created(0),
                recipient,
                quantity: 1,
            }
        );

        let write = group.state_write().unwrap();
        assert_eq!(write.instance, contract.instance());
        assert_eq!(write.last_token_id, TokenRef::Created(0));
    }

    #[tokio::test]
    async fn test_unauthorized_caller_never_reaches_the_ledger() {
        let mut contract = deploy("ADMIN").await;
        let intruder = CallerIdentity::new(account("INTRUDER"));

        let err = contract
            .issue(&intruder, &account("STUDENT"), "https://example.org/cert/1")
            .await
            .unwrap_err();

        assert!(err.is_unauthorized());
        assert_eq!(contract.ledger().unit_count().await, 0);
        assert_eq!(contract.get_last_token_id(), TokenId::new(0));
    }

    #[tokio::test]
    async fn test_receipt_carries_three_transaction_ids() {
        let mut contract = deploy("ADMIN").await;
        let admin = CallerIdentity::new(account("ADMIN"));

        let issuance = contract
            .issue_with_receipt(&admin, &account("STUDENT"), "https://example.org/cert/1")
            .await
            .unwrap();

        assert_eq!(issuance.recipient, account("STUDENT"));
        assert_ne!(issuance.creation_tx, issuance.registration_tx);
        assert_ne!(issuance.registration_tx, issuance.transfer_tx);
        assert_eq!(contract.last_issued(), Some(issuance.token_id));
    }

    #[tokio::test]
    async fn test_cached_state_follows_commit_even_on_malformed_receipt() {
        let ledger = TruncatingLedger(MemoryLedger::new(LedgerParams::feeless()));
        let admin = CallerIdentity::new(account("ADMIN"));
        let mut contract = IssuanceContract::initialize(ledger, &admin).await.unwrap();

        let err = contract
            .issue(&admin, &account("STUDENT"), "https://example.org/cert/1")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IssuanceError::LedgerOperationFailed(LedgerError::Storage { .. })
        ));

        let durable = contract.ledger().load_state(contract.instance()).await.unwrap();
        assert_eq!(durable.last_issued(), Some(TokenId::new(1)));
        assert_eq!(contract.last_issued(), durable.last_issued());
    }

    #[tokio::test]
    async fn test_attach_sees_durable_state() {
        let mut contract = deploy("ADMIN").await;
        let admin = CallerIdentity::new(account("ADMIN"));
        let token = contract
            .issue(&admin, &account("STUDENT"), "https://example.org/cert/1")
            .await
            .unwrap();

        let ledger = Arc::clone(contract.ledger());
        let reattached = IssuanceContract::attach(ledger, contract.instance())
            .await
            .unwrap();

        assert_eq!(reattached.get_admin(), &account("ADMIN"));
        assert_eq!(reattached.get_last_token_id(), token);
        assert_eq!(reattached.app_account(), contract.app_account());
    }

    #[tokio::test]
    async fn test_attach_to_unknown_instance_is_uninitialized_access() {
        let ledger = Arc::new(MemoryLedger::default());
        let result = IssuanceContract::attach(ledger, InstanceId::new(77)).await;

        assert!(matches!(
            result,
            Err(IssuanceError::UninitializedAccess { instance }) if instance == InstanceId::new(77)
        ));
    }
}
