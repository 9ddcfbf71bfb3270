//! Wire types for the subset of `bitcoind` calls the portal consumes.

use serde::{Deserialize, Serialize};

/// A deposit-address UTXO as reported by `listunspent`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RawUtxo {
    pub txid: String,
    pub vout: u32,
    pub address: String,
    /// Amount in BTC, not satoshis.
    pub amount: f64,
    pub confirmations: u64,
}

/// Subset of the `gettransaction` result the portal consumes.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GetTransaction {
    pub txid: String,
    /// May be negative for transactions conflicted out of the chain.
    pub confirmations: i64,
    /// Unix time in seconds.
    pub time: u64,
}
