use soroban_sdk::{Address, Env, String};

use crate::error::ContractError;
use crate::types::CertificateUnit;
use crate::{events, storage};

pub const MAX_REFERENCE_LEN: u32 = 96;
#[cfg(not(test))]
pub const MAX_HOLDINGS: u32 = 1_000;
#[cfg(test)]
pub const MAX_HOLDINGS: u32 = 3;

const CERTIFICATE_NAME: &str = "Certificate NFT";
const CERTIFICATE_UNIT: &str = "CERT";

/// Create, register and transfer in one invocation.
///
/// Any `Err` aborts the invocation and the host drops every write made
/// by the steps before it.
pub fn issue(
    env: &Env,
    caller: Address,
    recipient: Address,
    reference: String,
) -> Result<u64, ContractError> {
    let admin = storage::get_admin(env).ok_or(ContractError::NotInitialized)?;
    if caller != admin {
        return Err(ContractError::Unauthorized);
    }
    caller.require_auth();

    let custodian = env.current_contract_address();
    let token_id = create_unit(env, &admin, &custodian, reference)?;
    register_holder(env, token_id, &recipient)?;
    transfer_unit(env, token_id, &custodian, &recipient, 1)?;

    storage::set_last_token_id(env, token_id);
    events::issued(env, token_id, &recipient);
    Ok(token_id)
}

fn create_unit(
    env: &Env,
    admin: &Address,
    custodian: &Address,
    reference: String,
) -> Result<u64, ContractError> {
    let token_id = storage::next_token_id(env);
    if reference.len() > MAX_REFERENCE_LEN {
        return Err(ContractError::LedgerOperationFailed);
    }

    storage::set_unit(
        env,
        &CertificateUnit {
            token_id,
            total_supply: 1,
            decimals: 0,
            manager: admin.clone(),
            freeze: admin.clone(),
            clawback: admin.clone(),
            url: reference,
            name: String::from_str(env, CERTIFICATE_NAME),
            unit_name: String::from_str(env, CERTIFICATE_UNIT),
        },
    );
    storage::set_holding(env, token_id, custodian, 1);
    storage::set_owner(env, token_id, custodian);
    Ok(token_id)
}

fn register_holder(env: &Env, token_id: u64, holder: &Address) -> Result<(), ContractError> {
    if storage::get_unit(env, token_id).is_none() {
        return Err(ContractError::LedgerOperationFailed);
    }
    if storage::get_holding(env, token_id, holder).is_some() {
        return Ok(());
    }

    let count = storage::get_holding_count(env, holder);
    if count >= MAX_HOLDINGS {
        return Err(ContractError::LedgerOperationFailed);
    }
    storage::set_holding(env, token_id, holder, 0);
    storage::set_holding_count(env, holder, count + 1);
    Ok(())
}

fn transfer_unit(
    env: &Env,
    token_id: u64,
    from: &Address,
    to: &Address,
    amount: u64,
) -> Result<(), ContractError> {
    let to_bal =
        storage::get_holding(env, token_id, to).ok_or(ContractError::LedgerOperationFailed)?;
    let from_bal = storage::get_holding(env, token_id, from).unwrap_or(0);
    if from_bal < amount {
        return Err(ContractError::LedgerOperationFailed);
    }

    storage::set_holding(env, token_id, from, from_bal - amount);
    storage::set_holding(env, token_id, to, to_bal + amount);
    storage::set_owner(env, token_id, to);
    Ok(())
}
