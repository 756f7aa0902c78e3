//! End-to-end issuance against the in-process ledger runtime

use std::sync::Arc;

use certificate_minter::issuance::{CallerIdentity, IssuanceContract, IssuanceError};
use certificate_minter::ledger::{
    AccountIdentity, LedgerError, LedgerParams, LedgerRuntime, MemoryLedger, TokenId,
};

const REFERENCE: &str = "https://example.org/cert/1";

fn account(name: &str) -> AccountIdentity {
    AccountIdentity::new(name).expect("valid account")
}

async fn deploy(
    params: LedgerParams,
    funding: u64,
) -> (Arc<MemoryLedger>, IssuanceContract<Arc<MemoryLedger>>, CallerIdentity) {
    let ledger = Arc::new(MemoryLedger::new(params));
    let admin = CallerIdentity::new(account("ADMIN-A"));
    let contract = IssuanceContract::initialize(Arc::clone(&ledger), &admin)
        .await
        .expect("deploy");
    ledger
        .fund(contract.app_account(), funding)
        .await
        .expect("fund application account");
    (ledger, contract, admin)
}

#[tokio::test]
async fn test_admin_issues_distinct_tokens_and_outsiders_are_rejected() {
    let (ledger, mut contract, admin) = deploy(LedgerParams::default(), 1_000_000).await;
    let recipient = account("RECIPIENT-R");

    assert_eq!(contract.get_admin(), admin.account());
    assert_eq!(contract.get_last_token_id(), TokenId::new(0));
    assert!(contract.last_issued().is_none());

    let t1 = contract.issue(&admin, &recipient, REFERENCE).await.unwrap();
    assert_ne!(t1, TokenId::new(0));
    assert_eq!(contract.get_last_token_id(), t1);

    let t2 = contract.issue(&admin, &recipient, REFERENCE).await.unwrap();
    assert_ne!(t1, t2);
    assert_eq!(contract.get_last_token_id(), t2);

    let outsider = CallerIdentity::new(account("OUTSIDER"));
    let err = contract
        .issue(&outsider, &recipient, REFERENCE)
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(contract.get_last_token_id(), t2);
    assert_eq!(ledger.unit_count().await, 2);

    for token in [t1, t2] {
        assert_eq!(ledger.holding(&recipient, token).await.unwrap(), Some(1));
        assert_eq!(
            ledger.holding(contract.app_account(), token).await.unwrap(),
            Some(0)
        );
    }
}

#[tokio::test]
async fn test_minted_unit_carries_certificate_attributes() {
    let (ledger, mut contract, admin) = deploy(LedgerParams::default(), 1_000_000).await;
    let token = contract
        .issue(&admin, &account("RECIPIENT-R"), REFERENCE)
        .await
        .unwrap();

    let unit = ledger.unit(token).await.unwrap().expect("unit exists");
    assert_eq!(unit.total_supply, 1);
    assert_eq!(unit.decimals, 0);
    assert_eq!(unit.url, REFERENCE);
    assert_eq!(&unit.manager, admin.account());
    assert_eq!(&unit.freeze, admin.account());
    assert_eq!(&unit.clawback, admin.account());
    assert_eq!(&unit.creator, contract.app_account());
}

#[tokio::test]
async fn test_registration_failure_discards_the_whole_group() {
    let params = LedgerParams {
        max_holdings_per_account: 1,
        ..LedgerParams::feeless()
    };
    let (ledger, mut contract, admin) = deploy(params, 0).await;
    let recipient = account("RECIPIENT-R");

    let first = contract.issue(&admin, &recipient, REFERENCE).await.unwrap();

    // The recipient is at its holding limit, so the second opt-in is refused.
    let err = contract
        .issue(&admin, &recipient, REFERENCE)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        IssuanceError::LedgerOperationFailed(LedgerError::HoldingLimitReached { .. })
    ));

    assert_eq!(contract.get_last_token_id(), first);
    assert_eq!(ledger.unit_count().await, 1);
    assert_eq!(
        ledger.load_state(contract.instance()).await.unwrap().last_issued(),
        Some(first)
    );
}

#[tokio::test]
async fn test_fee_shortfall_fails_without_side_effects() {
    let params = LedgerParams::default();
    // Two of the three steps are covered.
    let funding = params.group_fee(2);
    let (ledger, mut contract, admin) = deploy(params, funding).await;

    let err = contract
        .issue(&admin, &account("RECIPIENT-R"), REFERENCE)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        IssuanceError::LedgerOperationFailed(LedgerError::InsufficientFee { .. })
    ));
    assert_eq!(ledger.balance(contract.app_account()).await, funding);
    assert_eq!(ledger.unit_count().await, 0);
    assert!(!contract.state().has_issued());
}

#[tokio::test]
async fn test_oversized_reference_is_a_ledger_rejection() {
    let (ledger, mut contract, admin) = deploy(LedgerParams::feeless(), 0).await;
    let reference = format!("https://example.org/{}", "x".repeat(96));

    let err = contract
        .issue(&admin, &account("RECIPIENT-R"), &reference)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        IssuanceError::LedgerOperationFailed(LedgerError::InvalidParameter { .. })
    ));
    assert_eq!(ledger.unit_count().await, 0);
    assert_eq!(contract.get_last_token_id(), TokenId::new(0));
}

#[tokio::test]
async fn test_reattached_contract_continues_from_durable_state() {
    let (ledger, mut contract, admin) = deploy(LedgerParams::feeless(), 0).await;
    let recipient = account("RECIPIENT-R");
    let t1 = contract.issue(&admin, &recipient, REFERENCE).await.unwrap();

    let mut reattached = IssuanceContract::attach(Arc::clone(&ledger), contract.instance())
        .await
        .unwrap();
    assert_eq!(reattached.get_admin(), admin.account());
    assert_eq!(reattached.get_last_token_id(), t1);

    let t2 = reattached.issue(&admin, &recipient, REFERENCE).await.unwrap();
    assert_ne!(t1, t2);
}

#[tokio::test]
async fn test_instances_keep_separate_admins() {
    let ledger = Arc::new(MemoryLedger::new(LedgerParams::feeless()));
    let alice = CallerIdentity::new(account("ALICE"));
    let bob = CallerIdentity::new(account("BOB"));

    let mut first = IssuanceContract::initialize(Arc::clone(&ledger), &alice)
        .await
        .unwrap();
    let second = IssuanceContract::initialize(Arc::clone(&ledger), &bob)
        .await
        .unwrap();

    assert_ne!(first.instance(), second.instance());
    assert_ne!(first.app_account(), second.app_account());

    let err = first
        .issue(&bob, &account("RECIPIENT-R"), REFERENCE)
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(second.get_last_token_id(), TokenId::new(0));
}
