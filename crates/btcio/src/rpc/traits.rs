//! The full-node call contract consumed by the portal.

use async_trait::async_trait;
use bitcoin::{Address, Txid};

use super::{
    client::ClientResult,
    types::{GetTransaction, RawUtxo},
};

/// Watch-only view of a `bitcoind` instance.
///
/// The portal never signs or spends; it imports deposit addresses for
/// tracking and reads their UTXOs back.
#[async_trait]
pub trait FullNodeRpc: Sync + Send + 'static {
    /// Registers `address` with the node's wallet as watch-only, without
    /// rescanning historical blocks. Corresponds to `importaddress`.
    async fn import_watch_address(&self, address: &Address) -> ClientResult<()>;

    /// Lists UTXOs paying any of `addresses` with a confirmation count inside
    /// the given bounds. Corresponds to `listunspent`.
    async fn list_unspent(
        &self,
        min_conf: u32,
        max_conf: u32,
        addresses: &[Address],
    ) -> ClientResult<Vec<RawUtxo>>;

    /// Fetches wallet detail for a watched transaction. Corresponds to
    /// `gettransaction`.
    async fn get_transaction(&self, txid: &Txid) -> ClientResult<GetTransaction>;

    /// Liveness probe. Corresponds to `ping`.
    async fn ping(&self) -> ClientResult<()>;
}
