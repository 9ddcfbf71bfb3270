//! Enumerated errors for the portal use cases.

use portal_btcio::rpc::error::ClientError;
use portal_derivation::DerivationError;
use portal_fees::FeeError;
use portal_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortalError {
    /// Validation and mismatch failures. Returned to the caller, never
    /// retried; registration aborts before any write.
    #[error(transparent)]
    Derivation(#[from] DerivationError),

    /// The claimed or stored BTC address does not decode for the configured
    /// network.
    #[error("invalid BTC address: {0}")]
    InvalidBtcAddress(String),

    /// The queried external transaction id is not a valid txid.
    #[error("invalid external transaction id: {0}")]
    InvalidTxid(String),

    /// Full-node failure. Surfaced as service-unavailable.
    #[error("full node error: {0}")]
    Node(#[from] ClientError),

    /// Fee oracle has no usable estimate. Surfaced as service-unavailable.
    #[error("fee oracle error: {0}")]
    Fee(#[from] FeeError),

    /// Persistence failure. Surfaced as an internal error.
    #[error("persistence error: {0}")]
    Store(#[from] StoreError),
}
