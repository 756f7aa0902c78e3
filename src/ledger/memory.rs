//! In-process ledger runtime.
//!
//! Groups are applied to the live book under its lock while every write is
//! journaled; a rejected group is replayed back from the journal before the
//! lock is released. Nothing of it is ever observable, and the contract never
//! has to undo anything itself.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::issuance::ContractState;
use crate::ledger::errors::{LedgerError, LedgerResult};
use crate::ledger::group::{AtomicGroup, GroupStep};
use crate::ledger::params::LedgerParams;
use crate::ledger::receipt::{step_tx_id, GroupReceipt, StepReceipt};
use crate::ledger::traits::LedgerRuntime;
use crate::ledger::types::{AccountIdentity, Deployment, InstanceId, TokenId, UnitRecord};

#[derive(Debug, Clone, Default)]
struct AccountRecord {
    balance: u64,
    /// Registered units, zero quantities included.
    holdings: BTreeMap<TokenId, u64>,
}

/// Prior value of an entry a group wrote, replayed in reverse on rejection.
#[derive(Debug)]
enum Undo {
    AccountOpened(AccountIdentity),
    Balance(AccountIdentity, u64),
    Holding(AccountIdentity, TokenId, Option<u64>),
    UnitCreated(TokenId),
    NextTokenId(u64),
    Instance(InstanceId, ContractState),
}

#[derive(Debug)]
struct Book {
    next_token_id: u64,
    next_instance_id: u64,
    accounts: HashMap<AccountIdentity, AccountRecord>,
    units: BTreeMap<TokenId, UnitRecord>,
    instances: HashMap<InstanceId, ContractState>,
}

impl Book {
    fn new(first_token_id: u64) -> Self {
        Self {
            next_token_id: first_token_id,
            next_instance_id: 1,
            accounts: HashMap::new(),
            units: BTreeMap::new(),
            instances: HashMap::new(),
        }
    }

    fn balance_of(&self, account: &AccountIdentity) -> u64 {
        self.accounts.get(account).map(|a| a.balance).unwrap_or(0)
    }

    fn held(&self, account: &AccountIdentity, token: TokenId) -> Option<u64> {
        self.accounts
            .get(account)
            .and_then(|a| a.holdings.get(&token).copied())
    }

    fn ensure_unit(&self, token: TokenId) -> LedgerResult<()> {
        if self.units.contains_key(&token) {
            Ok(())
        } else {
            Err(LedgerError::unknown_unit(token.value()))
        }
    }

    fn account_mut(
        &mut self,
        account: &AccountIdentity,
        journal: &mut Vec<Undo>,
    ) -> &mut AccountRecord {
        if !self.accounts.contains_key(account) {
            journal.push(Undo::AccountOpened(account.clone()));
        }
        self.accounts.entry(account.clone()).or_default()
    }

    fn set_balance(&mut self, account: &AccountIdentity, balance: u64, journal: &mut Vec<Undo>) {
        let record = self.account_mut(account, journal);
        let previous = std::mem::replace(&mut record.balance, balance);
        journal.push(Undo::Balance(account.clone(), previous));
    }

    fn set_holding(
        &mut self,
        account: &AccountIdentity,
        token: TokenId,
        amount: u64,
        journal: &mut Vec<Undo>,
    ) {
        let record = self.account_mut(account, journal);
        let previous = record.holdings.insert(token, amount);
        journal.push(Undo::Holding(account.clone(), token, previous));
    }

    fn charge_fee(
        &mut self,
        account: &AccountIdentity,
        fee: u64,
        journal: &mut Vec<Undo>,
    ) -> LedgerResult<()> {
        if fee == 0 {
            return Ok(());
        }
        let available = self.balance_of(account);
        if available < fee {
            return Err(LedgerError::insufficient_fee(account, available, fee));
        }
        self.set_balance(account, available - fee, journal);
        Ok(())
    }

    /// Apply `group` in place, journaling every write so a rejection can be undone.
    fn apply(
        &mut self,
        params: &LedgerParams,
        group: &AtomicGroup,
        group_id: &Uuid,
        journal: &mut Vec<Undo>,
    ) -> LedgerResult<Vec<StepReceipt>> {
        if group.is_empty() {
            return Err(LedgerError::EmptyGroup);
        }
        if let Some(instance) = group.instance() {
            if !self.instances.contains_key(&instance) {
                return Err(LedgerError::unknown_instance(instance.value()));
            }
        }

        let sender = group.sender();
        let mut created: Vec<TokenId> = Vec::new();
        let mut receipts = Vec::with_capacity(group.len());

        for (index, step) in group.steps().iter().enumerate() {
            self.charge_fee(sender, params.step_fee, journal)?;
            let tx_id = step_tx_id(group_id, index, step.kind());

            match step {
                GroupStep::CreateUnit(unit) => {
                    params.validate_unit(unit)?;

                    let token_id = TokenId::new(self.next_token_id);
                    let next = self
                        .next_token_id
                        .checked_add(1)
                        .ok_or_else(|| LedgerError::storage("unit id space exhausted"))?;
                    journal.push(Undo::NextTokenId(self.next_token_id));
                    self.next_token_id = next;

                    self.units.insert(
                        token_id,
                        UnitRecord::from_params(token_id, sender.clone(), unit),
                    );
                    journal.push(Undo::UnitCreated(token_id));
                    self.set_holding(sender, token_id, unit.total_supply, journal);

                    created.push(token_id);
                    receipts.push(StepReceipt::Created { tx_id, token_id });
                }
                GroupStep::RegisterHolder {
                    token,
                    holder,
                    quantity,
                } => {
                    let token_id = token.resolve(&created)?;
                    self.ensure_unit(token_id)?;
                    if *quantity != 0 {
                        return Err(LedgerError::invalid_parameter(
                            "quantity",
                            "registration must transfer zero units",
                        ));
                    }

                    if self.held(holder, token_id).is_none() {
                        let registered = self
                            .accounts
                            .get(holder)
                            .map(|a| a.holdings.len())
                            .unwrap_or(0);
                        if registered >= params.max_holdings_per_account {
                            return Err(LedgerError::holding_limit_reached(
                                holder,
                                params.max_holdings_per_account,
                            ));
                        }
                        self.set_holding(holder, token_id, 0, journal);
                    }

                    receipts.push(StepReceipt::Registered {
                        tx_id,
                        token_id,
                        holder: holder.clone(),
                    });
                }
                GroupStep::TransferUnit {
                    token,
                    recipient,
                    quantity,
                } => {
                    let token_id = token.resolve(&created)?;
                    self.ensure_unit(token_id)?;

                    if self.held(recipient, token_id).is_none() {
                        return Err(LedgerError::not_registered(recipient, token_id.value()));
                    }
                    let available = self.held(sender, token_id).unwrap_or(0);
                    if available < *quantity {
                        return Err(LedgerError::insufficient_units(
                            sender,
                            token_id.value(),
                            available,
                            *quantity,
                        ));
                    }

                    self.set_holding(sender, token_id, available - quantity, journal);
                    let received = self.held(recipient, token_id).unwrap_or(0);
                    self.set_holding(recipient, token_id, received.saturating_add(*quantity), journal);

                    receipts.push(StepReceipt::Transferred {
                        tx_id,
                        token_id,
                        from: sender.clone(),
                        to: recipient.clone(),
                        quantity: *quantity,
                    });
                }
            }
        }

        if let Some(write) = group.state_write() {
            let token_id = write.last_token_id.resolve(&created)?;
            let state = self
                .instances
                .get_mut(&write.instance)
                .ok_or_else(|| LedgerError::unknown_instance(write.instance.value()))?;
            journal.push(Undo::Instance(write.instance, state.clone()));
            state.record_issuance(token_id);
        }

        Ok(receipts)
    }

    fn rollback(&mut self, journal: Vec<Undo>) {
        for undo in journal.into_iter().rev() {
            match undo {
                Undo::AccountOpened(account) => {
                    self.accounts.remove(&account);
                }
                Undo::Balance(account, previous) => {
                    if let Some(record) = self.accounts.get_mut(&account) {
                        record.balance = previous;
                    }
                }
                Undo::Holding(account, token, previous) => {
                    if let Some(record) = self.accounts.get_mut(&account) {
                        match previous {
                            Some(amount) => record.holdings.insert(token, amount),
                            None => record.holdings.remove(&token),
                        };
                    }
                }
                Undo::UnitCreated(token) => {
                    self.units.remove(&token);
                }
                Undo::NextTokenId(previous) => self.next_token_id = previous,
                Undo::Instance(instance, previous) => {
                    self.instances.insert(instance, previous);
                }
            }
        }
    }
}

pub struct MemoryLedger {
    params: LedgerParams,
    book: Mutex<Book>,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new(LedgerParams::default())
    }
}

impl MemoryLedger {
    pub fn new(params: LedgerParams) -> Self {
        Self::with_first_token_id(params, 1)
    }

    /// Ledger whose first created unit receives `first_token_id`.
    pub fn with_first_token_id(params: LedgerParams, first_token_id: u64) -> Self {
        Self {
            params,
            book: Mutex::new(Book::new(first_token_id)),
        }
    }

    pub fn params(&self) -> &LedgerParams {
        &self.params
    }

    /// Credit `amount` to `account`, returning the new balance.
    pub async fn fund(&self, account: &AccountIdentity, amount: u64) -> LedgerResult<u64> {
        let mut book = self.book.lock().await;
        let record = book.accounts.entry(account.clone()).or_default();
        record.balance = record
            .balance
            .checked_add(amount)
            .ok_or_else(|| LedgerError::invalid_parameter("amount", "balance overflow"))?;
        debug!("Funded {} with {} (balance {})", account, amount, record.balance);
        Ok(record.balance)
    }

    pub async fn balance(&self, account: &AccountIdentity) -> u64 {
        self.book.lock().await.balance_of(account)
    }

    pub async fn unit_count(&self) -> usize {
        self.book.lock().await.units.len()
    }
}

#[async_trait]
impl LedgerRuntime for MemoryLedger {
    async fn deploy(&self, creator: &AccountIdentity) -> LedgerResult<Deployment> {
        let mut book = self.book.lock().await;

        let instance = InstanceId::new(book.next_instance_id);
        book.next_instance_id = book
            .next_instance_id
            .checked_add(1)
            .ok_or_else(|| LedgerError::storage("instance id space exhausted"))?;

        let state = ContractState::new(creator.clone());
        let app_account = AccountIdentity::application(instance);
        book.instances.insert(instance, state.clone());
        book.accounts.entry(app_account.clone()).or_default();

        info!(
            "Deployed contract instance {} for admin {} (application account {})",
            instance, creator, app_account
        );

        Ok(Deployment {
            instance,
            app_account,
            state,
        })
    }

    async fn load_state(&self, instance: InstanceId) -> LedgerResult<ContractState> {
        self.book
            .lock()
            .await
            .instances
            .get(&instance)
            .cloned()
            .ok_or_else(|| LedgerError::unknown_instance(instance.value()))
    }

    async fn submit_group(&self, group: AtomicGroup) -> LedgerResult<GroupReceipt> {
        let group_id = Uuid::new_v4();
        let mut book = self.book.lock().await;

        debug!(
            "Applying atomic group {} with {} steps from {}",
            group_id,
            group.len(),
            group.sender()
        );

        let mut journal = Vec::with_capacity(group.len() * 4);
        match book.apply(&self.params, &group, &group_id, &mut journal) {
            Ok(steps) => {
                info!("Committed atomic group {} ({} steps)", group_id, steps.len());
                Ok(GroupReceipt {
                    group_id,
                    steps,
                    committed_at: Utc::now(),
                })
            }
            Err(e) => {
                let undone = journal.len();
                book.rollback(journal);
                warn!(
                    "Atomic group {} rejected, {} writes undone: {}",
                    group_id, undone, e
                );
                Err(e)
            }
        }
    }

    async fn unit(&self, token: TokenId) -> LedgerResult<Option<UnitRecord>> {
        Ok(self.book.lock().await.units.get(&token).cloned())
    }

    async fn holding(
        &self,
        account: &AccountIdentity,
        token: TokenId,
    ) -> LedgerResult<Option<u64>> {
        Ok(self.book.lock().await.held(account, token))
    }

    async fn holders(&self, token: TokenId) -> LedgerResult<Vec<(AccountIdentity, u64)>> {
        let book = self.book.lock().await;
        let mut holders: Vec<(AccountIdentity, u64)> = book
            .accounts
            .iter()
            .filter_map(|(account, record)| {
                record
                    .holdings
                    .get(&token)
                    .filter(|amount| **amount > 0)
                    .map(|amount| (account.clone(), *amount))
            })
            .collect();
        holders.sort();
        Ok(holders)
    }

    async fn ping(&self) -> LedgerResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::group::{TokenRef, UnitParams};

    fn account(name: &str) -> AccountIdentity {
        AccountIdentity::new(name).unwrap()
    }

    fn unit(owner: &AccountIdentity) -> UnitParams {
        UnitParams {
            total_supply: 1,
            decimals: 0,
            manager: owner.clone(),
            freeze: owner.clone(),
            clawback: owner.clone(),
            url: "https://example.org/cert/1".to_string(),
            name: "Certificate NFT".to_string(),
            unit_name: "CERT".to_string(),
        }
    }

    #[tokio::test]
    async fn test_deploy_assigns_fresh_instances() {
        let ledger = MemoryLedger::default();
        let admin = account("ADMIN");

        let first = ledger.deploy(&admin).await.unwrap();
        let second = ledger.deploy(&admin).await.unwrap();

        assert_ne!(first.instance, second.instance);
        assert_eq!(first.state.admin(), &admin);
        assert_eq!(ledger.load_state(first.instance).await.unwrap(), first.state);
    }

    #[tokio::test]
    async fn test_load_state_of_unknown_instance_fails() {
        let ledger = MemoryLedger::default();
        let err = ledger.load_state(InstanceId::new(9)).await.unwrap_err();
        assert_eq!(err, LedgerError::unknown_instance(9));
    }

    #[tokio::test]
    async fn test_create_register_transfer_moves_custody() {
        let ledger = MemoryLedger::new(LedgerParams::feeless());
        let sender = account("app:1");
        let recipient = account("STUDENT");

        let group = AtomicGroup::begin(sender.clone())
            .create_unit(unit(&sender))
            .register_holder(TokenRef::Created(0), recipient.clone())
            .transfer_unit(TokenRef::Created(0), recipient.clone(), 1);
        let receipt = ledger.submit_group(group).await.unwrap();

        let token = receipt.created_units()[0];
        assert_eq!(receipt.steps.len(), 3);
        assert_eq!(ledger.holding(&recipient, token).await.unwrap(), Some(1));
        assert_eq!(ledger.holding(&sender, token).await.unwrap(), Some(0));
        assert_eq!(
            ledger.holders(token).await.unwrap(),
            vec![(recipient, 1)]
        );
    }

    #[tokio::test]
    async fn test_transfer_without_registration_discards_the_created_unit() {
        let ledger = MemoryLedger::new(LedgerParams::feeless());
        let sender = account("app:1");
        let recipient = account("STUDENT");

        let group = AtomicGroup::begin(sender.clone())
            .create_unit(unit(&sender))
            .transfer_unit(TokenRef::Created(0), recipient.clone(), 1);
        let err = ledger.submit_group(group).await.unwrap_err();

        assert_eq!(err, LedgerError::not_registered(&recipient, 1));
        assert_eq!(ledger.unit_count().await, 0);
        assert_eq!(ledger.holding(&sender, TokenId::new(1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_registration_for_wrong_unit_fails_the_transfer() {
        let ledger = MemoryLedger::new(LedgerParams::feeless());
        let sender = account("app:1");
        let recipient = account("STUDENT");

        let group = AtomicGroup::begin(sender.clone())
            .create_unit(unit(&sender))
            .register_holder(TokenRef::Existing(TokenId::new(999)), recipient.clone())
            .transfer_unit(TokenRef::Created(0), recipient, 1);
        let err = ledger.submit_group(group).await.unwrap_err();

        assert_eq!(err, LedgerError::unknown_unit(999));
        assert_eq!(ledger.unit_count().await, 0);
    }

    #[tokio::test]
    async fn test_fees_are_charged_per_step_and_refunded_on_rejection() {
        let ledger = MemoryLedger::default();
        let sender = account("app:1");
        let recipient = account("STUDENT");
        ledger.fund(&sender, 2_500).await.unwrap();

        let group = AtomicGroup::begin(sender.clone())
            .create_unit(unit(&sender))
            .register_holder(TokenRef::Created(0), recipient.clone())
            .transfer_unit(TokenRef::Created(0), recipient, 1);
        let err = ledger.submit_group(group).await.unwrap_err();

        assert_eq!(err, LedgerError::insufficient_fee(&sender, 500, 1_000));
        assert_eq!(ledger.balance(&sender).await, 2_500);
        assert_eq!(ledger.unit_count().await, 0);
    }

    #[tokio::test]
    async fn test_holding_limit_rejects_registration() {
        let params = LedgerParams {
            max_holdings_per_account: 1,
            ..LedgerParams::feeless()
        };
        let ledger = MemoryLedger::new(params);
        let sender = account("app:1");
        let recipient = account("STUDENT");

        let issue = |sender: &AccountIdentity| {
            AtomicGroup::begin(sender.clone())
                .create_unit(unit(sender))
                .register_holder(TokenRef::Created(0), recipient.clone())
                .transfer_unit(TokenRef::Created(0), recipient.clone(), 1)
        };

        ledger.submit_group(issue(&sender)).await.unwrap();
        let err = ledger.submit_group(issue(&sender)).await.unwrap_err();

        assert_eq!(err, LedgerError::holding_limit_reached(&recipient, 1));
        assert_eq!(ledger.unit_count().await, 1);
    }

    #[tokio::test]
    async fn test_rejected_group_restores_touched_state() {
        let ledger = MemoryLedger::default();
        let admin = account("ADMIN");
        let deployment = ledger.deploy(&admin).await.unwrap();
        let sender = deployment.app_account.clone();
        let recipient = account("STUDENT");
        ledger.fund(&sender, 10_000).await.unwrap();

        let issue = |quantity: u64| {
            AtomicGroup::begin(sender.clone())
                .create_unit(unit(&sender))
                .register_holder(TokenRef::Created(0), recipient.clone())
                .transfer_unit(TokenRef::Created(0), recipient.clone(), quantity)
                .write_last_token_id(deployment.instance, TokenRef::Created(0))
        };

        let first = ledger.submit_group(issue(1)).await.unwrap().created_units()[0];
        let state = ledger.load_state(deployment.instance).await.unwrap();

        // Over-transfer fails on the third step, after fees and a registration.
        let err = ledger.submit_group(issue(2)).await.unwrap_err();
        assert_eq!(
            err,
            LedgerError::insufficient_units(&sender, first.value() + 1, 1, 2)
        );

        assert_eq!(ledger.balance(&sender).await, 7_000);
        assert_eq!(ledger.unit_count().await, 1);
        assert_eq!(ledger.holding(&recipient, first).await.unwrap(), Some(1));
        assert_eq!(
            ledger.holding(&recipient, TokenId::new(first.value() + 1)).await.unwrap(),
            None
        );
        assert_eq!(ledger.load_state(deployment.instance).await.unwrap(), state);

        let next = ledger.submit_group(issue(1)).await.unwrap().created_units()[0];
        assert_eq!(next.value(), first.value() + 1);
    }

    #[tokio::test]
    async fn test_empty_group_is_rejected() {
        let ledger = MemoryLedger::default();
        let err = ledger
            .submit_group(AtomicGroup::begin(account("app:1")))
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::EmptyGroup);
    }

    #[tokio::test]
    async fn test_state_write_for_unknown_instance_aborts_group() {
        let ledger = MemoryLedger::new(LedgerParams::feeless());
        let sender = account("app:7");

        let group = AtomicGroup::begin(sender.clone())
            .create_unit(unit(&sender))
            .write_last_token_id(InstanceId::new(7), TokenRef::Created(0));
        let err = ledger.submit_group(group).await.unwrap_err();

        assert_eq!(err, LedgerError::unknown_instance(7));
        assert_eq!(ledger.unit_count().await, 0);
    }

    #[tokio::test]
    async fn test_first_token_id_is_configurable() {
        let ledger = MemoryLedger::with_first_token_id(LedgerParams::feeless(), 1_000);
        let sender = account("app:1");

        let receipt = ledger
            .submit_group(AtomicGroup::begin(sender.clone()).create_unit(unit(&sender)))
            .await
            .unwrap();
        assert_eq!(receipt.created_units(), vec![TokenId::new(1_000)]);
    }
}
