//! JSON-RPC plumbing for `bitcoind`.

pub mod client;
pub mod error;
pub mod traits;
pub mod types;

pub use client::{BitcoinClient, ClientResult};
pub use error::ClientError;
pub use traits::FullNodeRpc;
pub use types::{GetTransaction, RawUtxo};
