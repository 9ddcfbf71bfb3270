//! Errors for the fee oracle.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeeError {
    /// No usable fee estimate is currently cached.
    #[error("could not get fee from external source")]
    Unavailable,

    /// The outbound request to the fee source failed.
    #[error("fee source request failed: {0}")]
    Http(String),

    /// The fee source answered with a non-success status code.
    #[error("fee source returned status {0}")]
    Status(u16),

    /// The fee source response body could not be parsed.
    #[error("could not parse fee source response: {0}")]
    Parse(String),
}
