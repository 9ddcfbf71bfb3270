//! Deterministic derivation of watch-only multisig deposit addresses.
//!
//! Every user of the shielding bridge is assigned a unique M-of-N P2WSH
//! deposit address derived from the fixed custodial key set and the user's
//! own account identifier. Derivation uses only public data, so any third
//! party can recompute an address and audit that it is cryptographically
//! bound to its claimed owner without trusting the registering server.

pub mod engine;
pub mod error;

pub use engine::{AddressDerivationEngine, DerivedAddress, MasterKeySet};
pub use error::DerivationError;
