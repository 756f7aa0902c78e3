use soroban_sdk::{contracttype, Address, Env};

use crate::types::CertificateUnit;

#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    Admin,
    LastTokenId,
    NextTokenId,
    Unit(u64),
    /// Present once the account registered for the unit, even at zero.
    Holding(u64, Address),
    HoldingCount(Address),
    Owner(u64),
}

pub fn set_admin(env: &Env, admin: &Address) {
    env.storage().instance().set(&DataKey::Admin, admin);
}

pub fn get_admin(env: &Env) -> Option<Address> {
    env.storage().instance().get(&DataKey::Admin)
}

/// `0` until the first issuance.
pub fn get_last_token_id(env: &Env) -> u64 {
    env.storage()
        .instance()
        .get(&DataKey::LastTokenId)
        .unwrap_or(0)
}

pub fn set_last_token_id(env: &Env, token_id: u64) {
    env.storage().instance().set(&DataKey::LastTokenId, &token_id);
}

/// Allocate the next unit id. Ids start at 1.
pub fn next_token_id(env: &Env) -> u64 {
    let id: u64 = env
        .storage()
        .instance()
        .get(&DataKey::NextTokenId)
        .unwrap_or(1);
    env.storage().instance().set(&DataKey::NextTokenId, &(id + 1));
    id
}

pub fn get_unit(env: &Env, token_id: u64) -> Option<CertificateUnit> {
    env.storage().persistent().get(&DataKey::Unit(token_id))
}

pub fn set_unit(env: &Env, unit: &CertificateUnit) {
    env.storage()
        .persistent()
        .set(&DataKey::Unit(unit.token_id), unit);
}

pub fn get_holding(env: &Env, token_id: u64, holder: &Address) -> Option<u64> {
    env.storage()
        .persistent()
        .get(&DataKey::Holding(token_id, holder.clone()))
}

pub fn set_holding(env: &Env, token_id: u64, holder: &Address, amount: u64) {
    env.storage()
        .persistent()
        .set(&DataKey::Holding(token_id, holder.clone()), &amount);
}

pub fn get_holding_count(env: &Env, holder: &Address) -> u32 {
    env.storage()
        .persistent()
        .get(&DataKey::HoldingCount(holder.clone()))
        .unwrap_or(0)
}

pub fn set_holding_count(env: &Env, holder: &Address, count: u32) {
    env.storage()
        .persistent()
        .set(&DataKey::HoldingCount(holder.clone()), &count);
}

pub fn get_owner(env: &Env, token_id: u64) -> Option<Address> {
    env.storage().persistent().get(&DataKey::Owner(token_id))
}

pub fn set_owner(env: &Env, token_id: u64, owner: &Address) {
    env.storage()
        .persistent()
        .set(&DataKey::Owner(token_id), owner);
}
