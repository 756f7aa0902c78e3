//! Ledger runtime boundary
//!
//! Types and runtimes the issuance contract submits its atomic groups to.

pub mod errors;
pub mod group;
pub mod memory;
pub mod params;
pub mod receipt;
pub mod traits;
pub mod types;

pub use errors::{LedgerError, LedgerResult};
pub use group::{AtomicGroup, GroupStep, StateWrite, TokenRef, UnitParams};
pub use memory::MemoryLedger;
pub use params::LedgerParams;
pub use receipt::{GroupReceipt, StepReceipt};
pub use traits::LedgerRuntime;
pub use types::{AccountIdentity, Deployment, InstanceId, TokenId, UnitRecord};
