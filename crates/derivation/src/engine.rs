//! The derivation engine proper.
//!
//! All methods here are pure functions of the engine's immutable
//! configuration and their inputs. No I/O, no interior mutability, safe for
//! unsynchronized concurrent use.

use bitcoin::{
    base58,
    bip32::{ChainCode, ChildNumber, Fingerprint, Xpub},
    hashes::{sha256, Hash},
    opcodes::all::OP_CHECKMULTISIG,
    script::Builder,
    Address, Network, ScriptBuf,
};
use secp256k1::{PublicKey, SECP256K1};

use crate::error::DerivationError;

/// The fixed, ordered set of custodial public keys with the signature
/// threshold of the multisig policy.
///
/// Key order is significant: it determines the redeem script bytes and thus
/// the deposit address. The set is a deployment-time constant and must never
/// be reordered once addresses have been handed out.
#[derive(Debug, Clone)]
pub struct MasterKeySet {
    keys: Vec<PublicKey>,
    threshold: usize,
}

impl MasterKeySet {
    /// Creates a new key set, validating the threshold against the key count.
    pub fn new(keys: Vec<PublicKey>, threshold: usize) -> Result<Self, DerivationError> {
        if threshold == 0 || threshold > keys.len() {
            return Err(DerivationError::InvalidThreshold {
                required: threshold,
                total: keys.len(),
            });
        }

        Ok(Self { keys, threshold })
    }

    /// The custodial public keys in their canonical order.
    pub fn keys(&self) -> &[PublicKey] {
        &self.keys
    }

    /// The number of signatures required to spend.
    pub fn threshold(&self) -> usize {
        self.threshold
    }
}

/// The deterministic output of a derivation: the multisig redeem script and
/// its P2WSH address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedAddress {
    /// The M-of-N multisig witness script.
    pub redeem_script: ScriptBuf,

    /// The segwit v0 address committing to the script above.
    pub address: Address,
}

impl DerivedAddress {
    /// The bech32-encoded address string, as handed out to users.
    pub fn encoded(&self) -> String {
        self.address.to_string()
    }
}

/// Stateless engine deriving and verifying per-user deposit addresses.
#[derive(Debug, Clone)]
pub struct AddressDerivationEngine {
    keyset: MasterKeySet,
    network: Network,
}

impl AddressDerivationEngine {
    /// Creates an engine for the given key set and network parameters.
    pub fn new(keyset: MasterKeySet, network: Network) -> Self {
        Self { keyset, network }
    }

    /// The network this engine encodes addresses for.
    pub fn network(&self) -> Network {
        self.network
    }

    /// Derives the non-hardened BIP-32 child of `master` for the given seed.
    ///
    /// The seed is hashed to a 32-byte chain code and the child at index 0 is
    /// derived from a synthetic depth-0 extended key, i.e. the chain-code
    /// offset is added to the master point. Identical inputs always produce
    /// the identical child key, and the seed cannot be recovered from it.
    pub fn derive_child_key(
        &self,
        master: &PublicKey,
        seed: &str,
    ) -> Result<PublicKey, DerivationError> {
        let chain_code = sha256::Hash::hash(seed.as_bytes()).to_byte_array();

        let xpub = Xpub {
            network: self.network.into(),
            depth: 0,
            parent_fingerprint: Fingerprint::default(),
            child_number: ChildNumber::from_normal_idx(0)?,
            public_key: *master,
            chain_code: ChainCode::from(chain_code),
        };
        let child = xpub.ckd_pub(SECP256K1, ChildNumber::from_normal_idx(0)?)?;

        Ok(child.public_key)
    }

    /// Derives the deposit address for the given seed.
    ///
    /// An empty seed means the unmodified master set, which is the shared
    /// reserve/change address. Any other seed child-derives every custodial
    /// key, preserving the key order.
    pub fn derive_address(&self, seed: &str) -> Result<DerivedAddress, DerivationError> {
        let pubkeys = if seed.is_empty() {
            self.keyset.keys().to_vec()
        } else {
            self.keyset
                .keys()
                .iter()
                .map(|key| self.derive_child_key(key, seed))
                .collect::<Result<Vec<_>, _>>()?
        };

        // m-of-n multisig: OP_m <pubkey>... OP_n OP_CHECKMULTISIG
        let mut builder = Builder::new().push_int(self.keyset.threshold() as i64);
        for pubkey in &pubkeys {
            builder = builder.push_slice(pubkey.serialize());
        }
        let redeem_script = builder
            .push_int(pubkeys.len() as i64)
            .push_opcode(OP_CHECKMULTISIG)
            .into_script();

        // P2WSH: single SHA256 of the redeem script as the witness program.
        let address = Address::from_script(&redeem_script.to_p2wsh(), self.network)
            .map_err(|e| DerivationError::ScriptBuild(e.to_string()))?;

        Ok(DerivedAddress {
            redeem_script,
            address,
        })
    }

    /// Checks that `claimed` is exactly the deposit address assigned to
    /// `user_identifier`.
    ///
    /// The identifier must be a well-formed base58check account identifier.
    /// The claimed address must match the recomputed one byte for byte.
    pub fn verify_address_pair(
        &self,
        user_identifier: &str,
        claimed: &str,
    ) -> Result<(), DerivationError> {
        base58::decode_check(user_identifier)
            .map_err(|_| DerivationError::InvalidUserAddress)?;

        let derived = self.derive_address(user_identifier)?;
        if derived.encoded() != claimed {
            return Err(DerivationError::AddressMismatch);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER_KEYS: [&str; 4] = [
        "023034cb1a50f67f5eb2539e683bd48073712adff3259434726d628083d26f4cdd",
        "0274613293e7938594d258fbcfc53378dc82cd64d1c03301712f908572b917abc7",
        "03677a81fc9c4c9c0628d2f6d01e2715bb541175e962ae788fff26751eb524e0eb",
        "0302dbd4d46b4eefe9a6e864ceebb5112571288ac4cecaf410d4165f4c4ceb27e3",
    ];

    fn master_keys() -> Vec<PublicKey> {
        MASTER_KEYS
            .iter()
            .map(|k| k.parse().expect("test: static key"))
            .collect()
    }

    fn testnet_engine() -> AddressDerivationEngine {
        let keyset = MasterKeySet::new(master_keys(), 3).expect("test: keyset");
        AddressDerivationEngine::new(keyset, Network::Testnet)
    }

    /// A syntactically valid (base58check) account identifier.
    fn user_identifier(tag: u8) -> String {
        base58::encode_check(&[tag; 36])
    }

    #[test]
    fn derivation_is_deterministic() {
        let engine = testnet_engine();
        let a = engine.derive_address("abc").unwrap();
        let b = engine.derive_address("abc").unwrap();
        assert_eq!(a.redeem_script, b.redeem_script);
        assert_eq!(a.encoded(), b.encoded());
    }

    #[test]
    fn distinct_seeds_yield_distinct_addresses() {
        let engine = testnet_engine();
        let seeds = ["abc", "abd", "user-1", "user-2", "x"];
        let mut addrs: Vec<String> = seeds
            .iter()
            .map(|s| engine.derive_address(s).unwrap().encoded())
            .collect();
        addrs.sort();
        addrs.dedup();
        assert_eq!(addrs.len(), seeds.len());
    }

    #[test]
    fn empty_seed_uses_master_keys_verbatim() {
        let engine = testnet_engine();
        let derived = engine.derive_address("").unwrap();
        let script = derived.redeem_script.as_bytes();
        for key in master_keys() {
            let ser = key.serialize();
            assert!(
                script.windows(ser.len()).any(|w| w == ser),
                "master key missing from reserve redeem script"
            );
        }
    }

    #[test]
    fn child_keys_differ_from_master() {
        let engine = testnet_engine();
        for key in master_keys() {
            let child = engine.derive_child_key(&key, "abc").unwrap();
            assert_ne!(child, key);
        }
    }

    #[test]
    fn threshold_bounds() {
        assert!(matches!(
            MasterKeySet::new(master_keys(), 0),
            Err(DerivationError::InvalidThreshold { .. })
        ));
        assert!(matches!(
            MasterKeySet::new(master_keys(), 5),
            Err(DerivationError::InvalidThreshold { .. })
        ));
        assert!(MasterKeySet::new(master_keys(), 1).is_ok());
        assert!(MasterKeySet::new(master_keys(), 4).is_ok());
    }

    #[test]
    fn verification_accepts_own_address() {
        let engine = testnet_engine();
        let user = user_identifier(7);
        let derived = engine.derive_address(&user).unwrap();
        assert!(engine.verify_address_pair(&user, &derived.encoded()).is_ok());
    }

    #[test]
    fn verification_rejects_foreign_address() {
        let engine = testnet_engine();
        let user = user_identifier(7);
        let other = engine
            .derive_address(&user_identifier(8))
            .unwrap()
            .encoded();
        assert!(matches!(
            engine.verify_address_pair(&user, &other),
            Err(DerivationError::AddressMismatch)
        ));
    }

    #[test]
    fn verification_rejects_malformed_identifier() {
        let engine = testnet_engine();
        // 0OIl are not in the base58 alphabet.
        assert!(matches!(
            engine.verify_address_pair("0OIl", "tb1qwhatever"),
            Err(DerivationError::InvalidUserAddress)
        ));
    }

    #[test]
    fn testnet_addresses_are_segwit_v0() {
        let engine = testnet_engine();
        let derived = engine.derive_address("abc").unwrap();
        // P2WSH on testnet: tb1q..., 32-byte witness program.
        assert!(derived.encoded().starts_with("tb1q"));
    }
}
