//! The portal coordinator.
//!
//! Thin composition of the derivation engine, the store and the full node.
//! Registration is all-or-nothing up to the first failure point: nothing
//! durable happens until the final persistence step, so no rollback path is
//! needed.

use std::{
    str::FromStr,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use bitcoin::{Address, Txid};
use portal_btcio::rpc::traits::FullNodeRpc;
use portal_derivation::AddressDerivationEngine;
use portal_fees::FeeOracle;
use portal_store::{ShieldingAddressRecord, ShieldingStore, StoreError};
use serde::Serialize;
use tracing::*;

use crate::{
    errors::PortalError,
    history::{
        aggregate_deposit_history, classify_confirmations, status_detail, DepositHistoryEntry,
    },
};

/// Confirmation bounds used when listing deposit UTXOs.
const MIN_CONFIRMATIONS: u32 = 0;
const MAX_CONFIRMATIONS: u32 = 9_999_999;

/// Status report for a single external transaction.
#[derive(Debug, Clone, Serialize)]
pub struct DepositStatusReport {
    #[serde(rename = "externalTxID")]
    pub external_tx_id: String,
    pub status: u8,
    #[serde(rename = "statusStr")]
    pub status_str: String,
    #[serde(rename = "statusDetail")]
    pub status_detail: String,
}

/// Collaborator liveness, as reported by the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub node_ok: bool,
}

/// Composes the shielding use cases over the store and full-node
/// collaborators.
#[derive(Debug)]
pub struct ShieldingPortal<S, C> {
    engine: AddressDerivationEngine,
    store: Arc<S>,
    node: Arc<C>,
    fees: Arc<FeeOracle>,
    finality_depth: u64,
}

impl<S: ShieldingStore, C: FullNodeRpc> ShieldingPortal<S, C> {
    pub fn new(
        engine: AddressDerivationEngine,
        store: Arc<S>,
        node: Arc<C>,
        fees: Arc<FeeOracle>,
        finality_depth: u64,
    ) -> Self {
        Self {
            engine,
            store,
            node,
            fees,
            finality_depth,
        }
    }

    pub fn engine(&self) -> &AddressDerivationEngine {
        &self.engine
    }

    /// Checks that `btc_address` is the deposit address deterministically
    /// assigned to `user_address`.
    pub fn derive_and_verify(
        &self,
        user_address: &str,
        btc_address: &str,
    ) -> Result<(), PortalError> {
        self.engine.verify_address_pair(user_address, btc_address)?;
        Ok(())
    }

    /// Registers the pair if it is not registered yet. Returns whether a new
    /// record was created.
    ///
    /// Strict order: existence check, derivation verification, watch-import,
    /// persistence. The watch-import is never re-invoked for a pair that
    /// already exists, and the address is never persisted before its import
    /// succeeded.
    pub async fn register_if_absent(
        &self,
        user_address: &str,
        btc_address: &str,
    ) -> Result<bool, PortalError> {
        if self.store.exists(user_address, btc_address).await? {
            debug!(%user_address, "shielding address already registered");
            return Ok(false);
        }

        self.engine.verify_address_pair(user_address, btc_address)?;

        let address = self.parse_deposit_address(btc_address)?;
        self.node.import_watch_address(&address).await?;

        let record = ShieldingAddressRecord {
            user_address: user_address.to_string(),
            btc_address: btc_address.to_string(),
            created_at: unix_now(),
        };
        match self.store.save(record).await {
            Ok(()) => {
                info!(%user_address, %btc_address, "registered shielding address");
                Ok(true)
            }
            // Lost a race with a concurrent registration of the same pair.
            Err(StoreError::Duplicate) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Deposit history for the user's registered address. Best-effort: UTXOs
    /// whose transaction detail cannot be resolved are omitted.
    pub async fn deposit_history(
        &self,
        user_address: &str,
    ) -> Result<Vec<DepositHistoryEntry>, PortalError> {
        let btc_address = self.store.lookup_btc_address(user_address).await?;
        self.deposit_history_at(&btc_address, user_address).await
    }

    /// Deposit history for an explicit deposit address, same best-effort
    /// semantics.
    pub async fn deposit_history_at(
        &self,
        btc_address: &str,
        user_address: &str,
    ) -> Result<Vec<DepositHistoryEntry>, PortalError> {
        let address = self.parse_deposit_address(btc_address)?;

        let utxos = self
            .node
            .list_unspent(MIN_CONFIRMATIONS, MAX_CONFIRMATIONS, &[address])
            .await?;

        Ok(aggregate_deposit_history(
            self.node.clone(),
            utxos,
            user_address,
            self.finality_depth,
        )
        .await)
    }

    /// Current estimated shielding fee in satoshis, from the oracle snapshot.
    pub fn fee_estimate(&self) -> Result<f64, PortalError> {
        Ok(self.fees.estimated_shielding_fee()?)
    }

    /// Confirmation status of one external transaction.
    pub async fn status_by_txid(
        &self,
        external_txid: &str,
    ) -> Result<DepositStatusReport, PortalError> {
        let txid = Txid::from_str(external_txid)
            .map_err(|e| PortalError::InvalidTxid(e.to_string()))?;
        let tx = self.node.get_transaction(&txid).await?;

        let status = classify_confirmations(tx.confirmations, self.finality_depth);
        Ok(DepositStatusReport {
            external_tx_id: external_txid.to_string(),
            status: status.code(),
            status_str: status.as_str().to_string(),
            status_detail: status_detail(status, tx.confirmations),
        })
    }

    /// Registered records created in `[from, to)`, unix seconds.
    pub async fn records_in_range(
        &self,
        from: u64,
        to: u64,
    ) -> Result<Vec<ShieldingAddressRecord>, PortalError> {
        Ok(self.store.query_by_time_range(from, to).await?)
    }

    /// Collaborator liveness probe.
    pub async fn health(&self) -> HealthReport {
        HealthReport {
            node_ok: self.node.ping().await.is_ok(),
        }
    }

    fn parse_deposit_address(&self, address: &str) -> Result<Address, PortalError> {
        Address::from_str(address)
            .map_err(|e| PortalError::InvalidBtcAddress(e.to_string()))?
            .require_network(self.engine.network())
            .map_err(|e| PortalError::InvalidBtcAddress(e.to_string()))
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use bitcoin::{base58, Network};
    use portal_btcio::{rpc::types::RawUtxo, test_utils::TestBitcoinClient};
    use portal_derivation::{DerivationError, MasterKeySet};
    use portal_store::InMemoryStore;
    use secp256k1::PublicKey;

    use super::*;
    use crate::history::ShieldStatus;

    const MASTER_KEYS: [&str; 4] = [
        "023034cb1a50f67f5eb2539e683bd48073712adff3259434726d628083d26f4cdd",
        "0274613293e7938594d258fbcfc53378dc82cd64d1c03301712f908572b917abc7",
        "03677a81fc9c4c9c0628d2f6d01e2715bb541175e962ae788fff26751eb524e0eb",
        "0302dbd4d46b4eefe9a6e864ceebb5112571288ac4cecaf410d4165f4c4ceb27e3",
    ];

    fn engine() -> AddressDerivationEngine {
        let keys: Vec<PublicKey> = MASTER_KEYS
            .iter()
            .map(|k| k.parse().expect("test: static key"))
            .collect();
        let keyset = MasterKeySet::new(keys, 3).expect("test: keyset");
        AddressDerivationEngine::new(keyset, Network::Testnet)
    }

    fn user_identifier(tag: u8) -> String {
        base58::encode_check(&[tag; 36])
    }

    fn portal(
        node: TestBitcoinClient,
    ) -> ShieldingPortal<InMemoryStore, TestBitcoinClient> {
        let fees = FeeOracle::new("http://localhost/unused".to_string()).expect("test: oracle");
        ShieldingPortal::new(
            engine(),
            Arc::new(InMemoryStore::new()),
            Arc::new(node),
            Arc::new(fees),
            6,
        )
    }

    #[tokio::test]
    async fn registration_is_idempotent_without_duplicate_import() {
        let portal = portal(TestBitcoinClient::new(1));
        let user = user_identifier(1);
        let derived = portal.engine().derive_address(&user).unwrap();

        // Derivation is deterministic across independent calls.
        assert_eq!(
            derived.encoded(),
            portal.engine().derive_address(&user).unwrap().encoded()
        );

        let created = portal
            .register_if_absent(&user, &derived.encoded())
            .await
            .unwrap();
        assert!(created);
        assert_eq!(portal.node.import_call_count(), 1);

        let created = portal
            .register_if_absent(&user, &derived.encoded())
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(portal.node.import_call_count(), 1);
    }

    #[tokio::test]
    async fn registration_aborts_before_any_write_on_mismatch() {
        let portal = portal(TestBitcoinClient::new(1));
        let user = user_identifier(1);
        let foreign = portal
            .engine()
            .derive_address(&user_identifier(2))
            .unwrap()
            .encoded();

        let res = portal.register_if_absent(&user, &foreign).await;
        assert!(matches!(
            res,
            Err(PortalError::Derivation(DerivationError::AddressMismatch))
        ));
        assert_eq!(portal.node.import_call_count(), 0);
        assert!(!portal.store.exists(&user, &foreign).await.unwrap());
    }

    #[tokio::test]
    async fn registration_surfaces_node_failures_without_persisting() {
        let mut node = TestBitcoinClient::new(1);
        node.fail_import = true;
        let portal = portal(node);
        let user = user_identifier(3);
        let derived = portal.engine().derive_address(&user).unwrap().encoded();

        let res = portal.register_if_absent(&user, &derived).await;
        assert!(matches!(res, Err(PortalError::Node(_))));
        assert!(!portal.store.exists(&user, &derived).await.unwrap());
    }

    #[tokio::test]
    async fn history_flows_through_the_registered_address() {
        let user = user_identifier(4);
        let derived = engine().derive_address(&user).unwrap();

        let mut node = TestBitcoinClient::new(2);
        node.utxos = vec![RawUtxo {
            txid: format!("{:064x}", 42u8),
            vout: 0,
            address: derived.encoded(),
            amount: 0.00000001,
            confirmations: 2,
        }];
        let portal = portal(node);

        portal
            .register_if_absent(&user, &derived.encoded())
            .await
            .unwrap();

        let entries = portal.deposit_history(&user).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].amount, 10);
        assert_eq!(entries[0].user_address, user);
        assert_eq!(entries[0].status, ShieldStatus::Processing.code());
    }

    #[tokio::test]
    async fn history_for_unknown_user_is_not_found() {
        let portal = portal(TestBitcoinClient::new(1));
        let res = portal.deposit_history(&user_identifier(9)).await;
        assert!(matches!(
            res,
            Err(PortalError::Store(StoreError::NotFound))
        ));
    }

    #[tokio::test]
    async fn status_by_txid_validates_and_classifies() {
        let portal = portal(TestBitcoinClient::new(7));

        let res = portal.status_by_txid("not-a-txid").await;
        assert!(matches!(res, Err(PortalError::InvalidTxid(_))));

        let report = portal
            .status_by_txid(&format!("{:064x}", 1u8))
            .await
            .unwrap();
        assert_eq!(report.status, ShieldStatus::Finalized.code());
        assert_eq!(report.status_str, "Complete");
    }

    #[tokio::test]
    async fn fee_estimate_unavailable_before_first_refresh() {
        let portal = portal(TestBitcoinClient::new(1));
        assert!(matches!(
            portal.fee_estimate(),
            Err(PortalError::Fee(portal_fees::FeeError::Unavailable))
        ));
    }

    #[tokio::test]
    async fn health_reflects_node_liveness() {
        let healthy_portal = portal(TestBitcoinClient::new(1));
        assert!(healthy_portal.health().await.node_ok);

        let mut node = TestBitcoinClient::new(1);
        node.fail_ping = true;
        let portal = portal(node);
        assert!(!portal.health().await.node_ok);
    }
}
