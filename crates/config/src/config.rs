use bitcoin::Network;
use portal_derivation::{DerivationError, MasterKeySet};
use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default value for `finality_depth` in [`ShieldingConfig`].
const DEFAULT_FINALITY_DEPTH: u64 = 6;

/// Default value for `refresh_interval_secs` in [`FeeOracleConfig`].
const DEFAULT_FEE_REFRESH_SECS: u64 = 180;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("master key {0} is not valid hex")]
    MalformedKeyHex(usize),

    #[error("master key {0} is not a valid compressed public key")]
    MalformedKey(usize),

    #[error(transparent)]
    Keyset(#[from] DerivationError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitcoindConfig {
    pub rpc_url: String,
    pub rpc_user: String,
    pub rpc_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShieldingConfig {
    pub network: Network,

    /// Compressed custodial public keys, hex, in canonical order.
    pub master_keys: Vec<String>,

    /// How many of the custodial keys must sign a spend.
    pub threshold: usize,

    /// Confirmation depth at which a deposit counts as final.
    #[serde(default = "default_finality_depth")]
    pub finality_depth: u64,
}

impl ShieldingConfig {
    /// Parses the configured keys into the keyset used for derivation.
    pub fn master_key_set(&self) -> Result<MasterKeySet, ConfigError> {
        let mut keys = Vec::with_capacity(self.master_keys.len());
        for (i, raw) in self.master_keys.iter().enumerate() {
            let bytes = hex::decode(raw).map_err(|_| ConfigError::MalformedKeyHex(i))?;
            let key =
                PublicKey::from_slice(&bytes).map_err(|_| ConfigError::MalformedKey(i))?;
            keys.push(key);
        }
        Ok(MasterKeySet::new(keys, self.threshold)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeOracleConfig {
    /// HTTP endpoint returning the recommended fee rates.
    pub endpoint: String,

    #[serde(default = "default_fee_refresh_secs")]
    pub refresh_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub bitcoind: BitcoindConfig,
    pub shielding: ShieldingConfig,
    pub fees: FeeOracleConfig,
}

fn default_finality_depth() -> u64 {
    DEFAULT_FINALITY_DEPTH
}

fn default_fee_refresh_secs() -> u64 {
    DEFAULT_FEE_REFRESH_SECS
}
