#![allow(deprecated)]

use soroban_sdk::{symbol_short, Address, Env};

pub fn issued(env: &Env, token_id: u64, recipient: &Address) {
    env.events()
        .publish((symbol_short!("issued"), recipient.clone()), token_id);
}
