//! Input-output with the Bitcoin full node backing the shielding portal.
//!
//! Only the watch-only call contract is exposed here: importing deposit
//! addresses, listing their UTXOs and resolving transaction detail. Signing
//! and spending are out of scope for the portal.

pub mod rpc;

#[cfg(feature = "test_utils")]
pub mod test_utils;
