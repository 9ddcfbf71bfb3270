//! Deposit history aggregation.
//!
//! Turns the raw UTXO set of one deposit address into user-facing history
//! entries. Resolution of each UTXO is independent, so they are scattered as
//! one task each and joined at the end; a UTXO whose transaction cannot be
//! resolved is dropped from the result rather than failing the whole query.

use std::sync::Arc;

use bitcoin::Txid;
use portal_btcio::rpc::{traits::FullNodeRpc, types::RawUtxo};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::*;

/// Each satoshi mints this many base units on the other ledger.
pub const SHIELDED_SCALE: u64 = 10;

/// Wire code for shielding transactions in history output.
pub const SHIELD_TX_TYPE: u32 = 101;

/// Wire label for shielding transactions in history output.
pub const SHIELD_TX_TYPE_STR: &str = "Shield";

/// Converts a BTC amount to shielded base units, rounding half up on the
/// satoshi.
///
/// This is user-facing and must stay consistent with the minting accounting
/// downstream: every place that reports the same value goes through here.
pub fn btc_to_shielded_units(amount_btc: f64) -> u64 {
    (amount_btc * 1e8 + 0.5) as u64 * SHIELDED_SCALE
}

/// Deposit status as derived from confirmation depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShieldStatus {
    Failed,
    Finalized,
    Pending,
    Processing,
}

impl ShieldStatus {
    /// Numeric wire code, kept stable for downstream consumers.
    pub fn code(&self) -> u8 {
        match self {
            ShieldStatus::Failed => 0,
            ShieldStatus::Finalized => 1,
            ShieldStatus::Pending => 2,
            ShieldStatus::Processing => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ShieldStatus::Failed => "Failed",
            ShieldStatus::Finalized => "Complete",
            ShieldStatus::Pending => "Pending",
            ShieldStatus::Processing => "Processing",
        }
    }
}

/// Classifies a confirmation count.
///
/// `finality_depth` is deployment configuration, not a protocol constant.
/// Unconfirmed (or conflicted, negative-confirmation) transactions are
/// pending.
pub fn classify_confirmations(confirmations: i64, finality_depth: u64) -> ShieldStatus {
    if confirmations <= 0 {
        ShieldStatus::Pending
    } else if (confirmations as u64) < finality_depth {
        ShieldStatus::Processing
    } else {
        ShieldStatus::Finalized
    }
}

/// Human-readable status annotation for history entries.
pub fn status_detail(status: ShieldStatus, confirmations: i64) -> String {
    match status {
        ShieldStatus::Pending => {
            "The shielding transaction is waiting to confirm.".to_string()
        }
        ShieldStatus::Processing => format!(
            "The shielding transaction is confirmed with {} blocks.",
            confirmations
        ),
        ShieldStatus::Finalized => format!(
            "The shielding transaction is complete with {} confirmations.",
            confirmations
        ),
        ShieldStatus::Failed => "The shielding transaction failed.".to_string(),
    }
}

/// One user-facing deposit history entry.
#[derive(Debug, Clone, Serialize)]
pub struct DepositHistoryEntry {
    /// Amount in shielded base units.
    pub amount: u64,
    #[serde(rename = "externalTxID")]
    pub external_tx_id: String,
    #[serde(rename = "userAddress")]
    pub user_address: String,
    pub status: u8,
    #[serde(rename = "statusStr")]
    pub status_str: String,
    #[serde(rename = "statusDetail")]
    pub status_detail: String,
    /// Milliseconds since epoch.
    pub time: i64,
    #[serde(rename = "txType")]
    pub tx_type: u32,
    #[serde(rename = "txTypeStr")]
    pub tx_type_str: String,
}

/// Builds history entries for all given UTXOs, best-effort.
///
/// One task per UTXO, no pooling; concurrency is bounded by the input size.
/// The call returns only once every spawned unit has finished or been
/// abandoned as failed. Output order is unspecified.
pub async fn aggregate_deposit_history<C: FullNodeRpc>(
    node: Arc<C>,
    utxos: Vec<RawUtxo>,
    user_address: &str,
    finality_depth: u64,
) -> Vec<DepositHistoryEntry> {
    let mut workers = JoinSet::new();
    for utxo in utxos {
        let node = node.clone();
        let user_address = user_address.to_string();
        workers.spawn(async move {
            resolve_history_entry(node.as_ref(), utxo, &user_address, finality_depth).await
        });
    }

    let mut entries = Vec::new();
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Some(entry)) => entries.push(entry),
            // Resolution failure, already logged; the entry is omitted.
            Ok(None) => {}
            Err(e) => warn!(%e, "deposit history worker died"),
        }
    }
    entries
}

async fn resolve_history_entry<C: FullNodeRpc>(
    node: &C,
    utxo: RawUtxo,
    user_address: &str,
    finality_depth: u64,
) -> Option<DepositHistoryEntry> {
    let txid = match utxo.txid.parse::<Txid>() {
        Ok(txid) => txid,
        Err(e) => {
            warn!(txid = %utxo.txid, %e, "could not parse deposit txid");
            return None;
        }
    };

    let tx = match node.get_transaction(&txid).await {
        Ok(tx) => tx,
        Err(e) => {
            warn!(%txid, %e, "could not resolve deposit transaction");
            return None;
        }
    };

    let confirmations = utxo.confirmations as i64;
    let status = classify_confirmations(confirmations, finality_depth);

    Some(DepositHistoryEntry {
        amount: btc_to_shielded_units(utxo.amount),
        external_tx_id: utxo.txid,
        user_address: user_address.to_string(),
        status: status.code(),
        status_str: status.as_str().to_string(),
        status_detail: status_detail(status, confirmations),
        time: tx.time as i64 * 1000,
        tx_type: SHIELD_TX_TYPE,
        tx_type_str: SHIELD_TX_TYPE_STR.to_string(),
    })
}
