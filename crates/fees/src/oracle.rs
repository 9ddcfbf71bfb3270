//! The fee cache and its refresh task.

use std::{sync::Arc, sync::RwLock, time::Duration};

use reqwest::Client;
use serde::Deserialize;
use tokio::time::sleep;
use tracing::*;

use crate::error::FeeError;

/// Virtual size of one input spending a 3-of-4 P2WSH multisig UTXO.
pub const VBYTES_PER_INPUT: f64 = 192.25;

/// Virtual size of one P2WSH output.
pub const VBYTES_PER_OUTPUT: f64 = 43.0;

/// Fixed transaction overhead (version, locktime, counts, segwit marker).
pub const VBYTES_OVERHEAD: f64 = 10.75;

/// Overpay margin applied on top of the raw estimate.
pub const OVERPAY_FACTOR: f64 = 1.15;

/// Fixed timeout for a single request to the fee source.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// The latest known network fee rate.
///
/// Written by the refresh task only; read by arbitrarily many callers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeSnapshot {
    /// Fee rate in satoshi per virtual byte. Negative means unknown.
    pub fee_per_vbyte: f64,
}

impl FeeSnapshot {
    /// Sentinel for "no usable estimate right now".
    pub const UNKNOWN: Self = Self { fee_per_vbyte: -1.0 };

    pub fn is_known(&self) -> bool {
        self.fee_per_vbyte >= 0.0
    }
}

/// Response shape of the external fee-estimation endpoint. Fields other than
/// the medium rate are ignored.
#[derive(Debug, Deserialize)]
struct FeeSourceResponse {
    medium_fee_per_kb: f64,
}

/// Shared cache of the latest fee estimate.
#[derive(Debug)]
pub struct FeeOracle {
    snapshot: RwLock<FeeSnapshot>,
    http: Client,
    endpoint: String,
}

impl FeeOracle {
    /// Creates an oracle polling the given endpoint. The snapshot starts out
    /// unknown until the first successful refresh.
    pub fn new(endpoint: String) -> Result<Self, FeeError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| FeeError::Http(e.to_string()))?;

        Ok(Self {
            snapshot: RwLock::new(FeeSnapshot::UNKNOWN),
            http,
            endpoint,
        })
    }

    /// Reads the current snapshot. A single consistent value, never one torn
    /// mid-update by the refresh task.
    pub fn snapshot(&self) -> FeeSnapshot {
        *self.snapshot.read().expect("feeoracle: poisoned lock")
    }

    /// Estimated total fee in satoshis for the canonical 2-input/2-output
    /// transaction shape, with the overpay margin applied.
    pub fn estimated_shielding_fee(&self) -> Result<f64, FeeError> {
        let snapshot = self.snapshot();
        if !snapshot.is_known() {
            return Err(FeeError::Unavailable);
        }

        let vbytes = 2.0 * VBYTES_PER_INPUT + 2.0 * VBYTES_PER_OUTPUT + VBYTES_OVERHEAD;
        Ok(snapshot.fee_per_vbyte * vbytes * OVERPAY_FACTOR)
    }

    /// Replaces the snapshot. The write lock covers only this assignment,
    /// never the outbound fetch, so readers are not stalled by network I/O.
    fn store(&self, snapshot: FeeSnapshot) {
        *self.snapshot.write().expect("feeoracle: poisoned lock") = snapshot;
    }

    async fn fetch_fee_per_vbyte(&self) -> Result<f64, FeeError> {
        let resp = self
            .http
            .get(&self.endpoint)
            .send()
            .await
            .map_err(|e| FeeError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(FeeError::Status(resp.status().as_u16()));
        }

        let body: FeeSourceResponse = resp
            .json()
            .await
            .map_err(|e| FeeError::Parse(e.to_string()))?;

        Ok(body.medium_fee_per_kb / 1024.0)
    }

    /// One refresh tick. Failures downgrade the snapshot to unknown instead
    /// of propagating; the next tick is the only retry.
    pub async fn refresh_once(&self) {
        match self.fetch_fee_per_vbyte().await {
            Ok(fee_per_vbyte) => {
                debug!(%fee_per_vbyte, "refreshed fee snapshot");
                self.store(FeeSnapshot { fee_per_vbyte });
            }
            Err(e) => {
                warn!(%e, "fee refresh failed, marking estimate unknown");
                self.store(FeeSnapshot::UNKNOWN);
            }
        }
    }
}

/// Perpetual refresh loop. Started once at process start; never exits.
pub async fn fee_refresh_task(oracle: Arc<FeeOracle>, interval: Duration) {
    info!(interval_secs = interval.as_secs(), "starting fee refresh task");
    loop {
        oracle.refresh_once().await;
        sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use super::*;

    /// Serves exactly one HTTP response on a local port and returns the
    /// endpoint URL.
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });
        format!("http://{addr}/fees")
    }

    #[test]
    fn medium_rate_converts_kb_to_vbyte() {
        let body: FeeSourceResponse =
            serde_json::from_str(r#"{"high_fee_per_kb": 2048, "medium_fee_per_kb": 1024, "low_fee_per_kb": 512}"#)
                .unwrap();
        assert_eq!(body.medium_fee_per_kb / 1024.0, 1.0);
    }

    #[test]
    fn estimate_uses_canonical_two_in_two_out_shape() {
        let oracle = FeeOracle::new("http://localhost/unused".to_string()).unwrap();
        oracle.store(FeeSnapshot { fee_per_vbyte: 1.0 });

        let fee = oracle.estimated_shielding_fee().unwrap();
        let expected = 1.0 * (2.0 * 192.25 + 2.0 * 43.0 + 10.75) * 1.15;
        assert!((fee - expected).abs() < 1e-9);
        assert!((fee - 553.4375).abs() < 1e-9);
    }

    #[test]
    fn estimate_unavailable_until_first_refresh() {
        let oracle = FeeOracle::new("http://localhost/unused".to_string()).unwrap();
        assert!(matches!(
            oracle.estimated_shielding_fee(),
            Err(FeeError::Unavailable)
        ));
    }

    #[test]
    fn failed_refresh_downgrades_known_snapshot() {
        let oracle = FeeOracle::new("http://localhost/unused".to_string()).unwrap();
        oracle.store(FeeSnapshot { fee_per_vbyte: 12.5 });
        assert!(oracle.estimated_shielding_fee().is_ok());

        oracle.store(FeeSnapshot::UNKNOWN);
        assert!(matches!(
            oracle.estimated_shielding_fee(),
            Err(FeeError::Unavailable)
        ));
    }

    #[tokio::test]
    async fn refresh_fetches_and_stores_the_medium_rate() {
        let endpoint = serve_once(
            "200 OK",
            r#"{"high_fee_per_kb": 2048, "medium_fee_per_kb": 1024, "low_fee_per_kb": 512}"#,
        )
        .await;

        let oracle = FeeOracle::new(endpoint).unwrap();
        oracle.refresh_once().await;

        assert_eq!(oracle.snapshot().fee_per_vbyte, 1.0);
    }

    #[tokio::test]
    async fn refresh_downgrades_on_source_failure_status() {
        let endpoint = serve_once("503 Service Unavailable", "{}").await;

        let oracle = FeeOracle::new(endpoint).unwrap();
        oracle.store(FeeSnapshot { fee_per_vbyte: 12.5 });
        oracle.refresh_once().await;

        assert!(!oracle.snapshot().is_known());
    }

    #[tokio::test]
    async fn refresh_downgrades_on_unparseable_body() {
        let endpoint = serve_once("200 OK", r#"{"fastestFee": 42}"#).await;

        let oracle = FeeOracle::new(endpoint).unwrap();
        oracle.store(FeeSnapshot { fee_per_vbyte: 12.5 });
        oracle.refresh_once().await;

        assert!(!oracle.snapshot().is_known());
    }
}
