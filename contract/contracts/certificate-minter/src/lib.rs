#![no_std]

mod contract;
mod error;
mod events;
mod storage;
mod types;

pub use contract::{MAX_HOLDINGS, MAX_REFERENCE_LEN};
pub use error::ContractError;
pub use types::CertificateUnit;

use soroban_sdk::{contract, contractimpl, Address, Env, String};

#[contract]
pub struct CertificateMinter;

#[contractimpl]
impl CertificateMinter {
    /// Runs once, when the instance is created.
    pub fn __constructor(env: Env, admin: Address) {
        storage::set_admin(&env, &admin);
    }

    pub fn issue(
        env: Env,
        caller: Address,
        recipient: Address,
        reference: String,
    ) -> Result<u64, ContractError> {
        contract::issue(&env, caller, recipient, reference)
    }

    pub fn get_admin(env: Env) -> Result<Address, ContractError> {
        storage::get_admin(&env).ok_or(ContractError::NotInitialized)
    }

    pub fn get_last_token_id(env: Env) -> u64 {
        storage::get_last_token_id(&env)
    }

    pub fn unit(env: Env, token_id: u64) -> Option<CertificateUnit> {
        storage::get_unit(&env, token_id)
    }

    /// Units held; `None` when `holder` never registered for the unit.
    pub fn holding(env: Env, token_id: u64, holder: Address) -> Option<u64> {
        storage::get_holding(&env, token_id, &holder)
    }

    pub fn holder(env: Env, token_id: u64) -> Option<Address> {
        storage::get_owner(&env, token_id)
    }
}
