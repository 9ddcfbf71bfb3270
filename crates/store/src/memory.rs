//! In-memory reference implementation of the store contract.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::{ShieldingAddressRecord, ShieldingStore, StoreError};

/// Mutex-over-Vec store. Fine for tests and single-process deployments;
/// production deployments plug a real database behind the same trait.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: Mutex<Vec<ShieldingAddressRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_records<T>(&self, f: impl FnOnce(&mut Vec<ShieldingAddressRecord>) -> T) -> T {
        let mut records = self.records.lock().expect("store: poisoned lock");
        f(&mut records)
    }
}

#[async_trait]
impl ShieldingStore for InMemoryStore {
    async fn exists(&self, user_address: &str, btc_address: &str) -> Result<bool, StoreError> {
        Ok(self.with_records(|records| {
            records
                .iter()
                .any(|r| r.user_address == user_address && r.btc_address == btc_address)
        }))
    }

    async fn save(&self, record: ShieldingAddressRecord) -> Result<(), StoreError> {
        self.with_records(|records| {
            let duplicate = records.iter().any(|r| {
                r.user_address == record.user_address && r.btc_address == record.btc_address
            });
            if duplicate {
                return Err(StoreError::Duplicate);
            }
            records.push(record);
            Ok(())
        })
    }

    async fn query_by_time_range(
        &self,
        from: u64,
        to: u64,
    ) -> Result<Vec<ShieldingAddressRecord>, StoreError> {
        Ok(self.with_records(|records| {
            records
                .iter()
                .filter(|r| r.created_at >= from && r.created_at < to)
                .cloned()
                .collect()
        }))
    }

    async fn lookup_btc_address(&self, user_address: &str) -> Result<String, StoreError> {
        self.with_records(|records| {
            records
                .iter()
                .find(|r| r.user_address == user_address)
                .map(|r| r.btc_address.clone())
                .ok_or(StoreError::NotFound)
        })
    }
}
