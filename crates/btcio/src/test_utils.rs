//! Stub full-node implementation for tests in dependent crates.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use async_trait::async_trait;
use bitcoin::{Address, Txid};

use crate::rpc::{
    error::ClientError,
    traits::FullNodeRpc,
    types::{GetTransaction, RawUtxo},
    ClientResult,
};

/// A test implementation of the watch-only full-node contract.
///
/// Behavior is driven by plain fields so tests can set up exactly the
/// scenario they need; `import_calls` counts watch-import invocations.
#[derive(Debug, Clone, Default)]
pub struct TestBitcoinClient {
    /// Confirmations reported for every transaction lookup.
    pub confs: i64,
    /// Unix time (seconds) reported for every transaction lookup.
    pub tx_time: u64,
    /// UTXOs returned by `list_unspent`, regardless of the queried address.
    pub utxos: Vec<RawUtxo>,
    /// Txids for which `get_transaction` fails with a server error.
    pub failing_txids: Vec<String>,
    /// Whether watch-import calls fail.
    pub fail_import: bool,
    /// Whether ping calls fail.
    pub fail_ping: bool,
    /// Number of watch-import calls made so far.
    pub import_calls: Arc<AtomicUsize>,
}

impl TestBitcoinClient {
    pub fn new(confs: i64) -> Self {
        Self {
            confs,
            tx_time: 1_700_000_000,
            ..Default::default()
        }
    }

    pub fn import_call_count(&self) -> usize {
        self.import_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FullNodeRpc for TestBitcoinClient {
    async fn import_watch_address(&self, _address: &Address) -> ClientResult<()> {
        self.import_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_import {
            return Err(ClientError::Connection("node is down".to_string()));
        }
        Ok(())
    }

    async fn list_unspent(
        &self,
        _min_conf: u32,
        _max_conf: u32,
        _addresses: &[Address],
    ) -> ClientResult<Vec<RawUtxo>> {
        Ok(self.utxos.clone())
    }

    async fn get_transaction(&self, txid: &Txid) -> ClientResult<GetTransaction> {
        let txid = txid.to_string();
        if self.failing_txids.contains(&txid) {
            return Err(ClientError::Server(
                -5,
                "Invalid or non-wallet transaction id".to_string(),
            ));
        }
        Ok(GetTransaction {
            txid,
            confirmations: self.confs,
            time: self.tx_time,
        })
    }

    async fn ping(&self) -> ClientResult<()> {
        if self.fail_ping {
            return Err(ClientError::Timeout);
        }
        Ok(())
    }
}
