use soroban_sdk::{contracttype, Address, String};

/// Attributes fixed when a certificate unit is created.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CertificateUnit {
    pub token_id: u64,
    pub total_supply: u64,
    pub decimals: u32,
    pub manager: Address,
    pub freeze: Address,
    pub clawback: Address,
    pub url: String,
    pub name: String,
    pub unit_name: String,
}
