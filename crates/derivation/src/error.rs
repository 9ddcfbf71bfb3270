//! Enumerated errors for address derivation and verification.

use thiserror::Error;

/// Error during derivation or verification of a deposit address.
#[derive(Debug, Error)]
pub enum DerivationError {
    /// The signature threshold does not fit the key set.
    #[error("invalid signature requirement: {required} of {total}")]
    InvalidThreshold {
        /// The requested number of required signatures.
        required: usize,
        /// The total number of custodial keys.
        total: usize,
    },

    /// The user account identifier failed base58check decoding.
    #[error("malformed user account identifier")]
    InvalidUserAddress,

    /// The claimed address is not the one derived for this user.
    #[error("claimed address does not match the derived deposit address")]
    AddressMismatch,

    /// BIP-32 child key derivation failed.
    ///
    /// This only happens for invalid master keys and is treated as a
    /// programming-error-class failure by callers.
    #[error("child key derivation failed: {0}")]
    Bip32(#[from] bitcoin::bip32::Error),

    /// The redeem script could not be encoded as a segwit address.
    #[error("could not encode deposit address: {0}")]
    ScriptBuild(String),
}
