//! Persistence contract for registered shielding addresses.
//!
//! The portal only ever appends records; a `(user, btc)` pair is unique and
//! never mutated or deleted once created. The actual backing store lives
//! behind the [`ShieldingStore`] trait; an in-memory implementation is
//! provided for tests and single-process deployments.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::InMemoryStore;

/// One registered shielding address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldingAddressRecord {
    /// The owning user's account identifier on the other ledger.
    pub user_address: String,
    /// The BTC deposit address derived for that user.
    pub btc_address: String,
    /// Registration time, unix seconds.
    pub created_at: u64,
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// No record for the queried user.
    #[error("no shielding address registered for this user")]
    NotFound,

    /// The `(user, btc)` pair already exists.
    #[error("record has already been inserted")]
    Duplicate,

    /// Backend failure (connectivity, I/O, ...).
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Append-only store of shielding address registrations.
#[async_trait]
pub trait ShieldingStore: Sync + Send + 'static {
    /// Whether the exact `(user, btc)` pair is already registered.
    async fn exists(&self, user_address: &str, btc_address: &str) -> Result<bool, StoreError>;

    /// Appends a new record. Fails with [`StoreError::Duplicate`] if the pair
    /// already exists.
    async fn save(&self, record: ShieldingAddressRecord) -> Result<(), StoreError>;

    /// All records created in the half-open range `[from, to)` (unix
    /// seconds).
    async fn query_by_time_range(
        &self,
        from: u64,
        to: u64,
    ) -> Result<Vec<ShieldingAddressRecord>, StoreError>;

    /// The BTC address registered for the given user, if any.
    async fn lookup_btc_address(&self, user_address: &str) -> Result<String, StoreError>;
}
