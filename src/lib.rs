pub mod api;
pub mod config;
#[cfg(feature = "database")]
pub mod database;
pub mod issuance;
pub mod ledger;
