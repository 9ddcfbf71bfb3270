//! Network fee oracle for the shielding portal.
//!
//! A single background task polls an external fee-estimation source on a
//! fixed cadence and keeps the latest fee-per-vbyte figure in a shared
//! snapshot; request handlers read the snapshot synchronously.

pub mod error;
pub mod oracle;

pub use error::FeeError;
pub use oracle::{fee_refresh_task, FeeOracle, FeeSnapshot};
