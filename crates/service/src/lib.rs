//! The shielding portal service core.
//!
//! Composes the derivation engine, the persistence store and the full node
//! into the register-if-absent and deposit-history use cases. The HTTP layer
//! sits on top of [`ShieldingPortal`] and is not part of this crate.

pub mod errors;
pub mod history;
pub mod portal;

pub use errors::PortalError;
pub use history::{
    aggregate_deposit_history, btc_to_shielded_units, classify_confirmations,
    DepositHistoryEntry, ShieldStatus, SHIELDED_SCALE,
};
pub use portal::{DepositStatusReport, HealthReport, ShieldingPortal};
