//! Certificate issuance
//!
//! The admin-gated state machine that mints a certificate unit, registers the
//! recipient and transfers custody as one atomic group.

pub mod contract;
pub mod error;
pub mod state;
pub mod types;

pub use contract::IssuanceContract;
pub use error::{IssuanceError, IssuanceResult};
pub use state::ContractState;
pub use types::{CallerIdentity, Issuance, CERTIFICATE_NAME, CERTIFICATE_UNIT};
