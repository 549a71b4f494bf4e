//! In-memory storage backend.
//!
//! Backs tests and single-process development runs. Every operation takes
//! the one interior lock, so each mutation is atomic exactly like a
//! single LMDB write transaction.

use std::collections::HashMap;
use std::sync::Mutex;

use aqueduct_types::{AddressMapping, CoinAddress, LedgerAddress, ProcessedRecord, TxHash};

use crate::mappings::AddressDeriver;
use crate::{MappingStore, MetaStore, ProcessedStore, StoreError};

#[derive(Default)]
struct Inner {
    deposits: HashMap<TxHash, ProcessedRecord>,
    withdrawals: HashMap<TxHash, ProcessedRecord>,
    by_owner: HashMap<LedgerAddress, AddressMapping>,
    by_address: HashMap<CoinAddress, AddressMapping>,
    next_index: HashMap<u32, u32>,
    meta: HashMap<String, Vec<u8>>,
}

/// In-memory implementation of all bridge storage traits.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }
}

impl ProcessedStore for MemoryStore {
    fn is_deposit_processed(&self, tx: &TxHash) -> Result<bool, StoreError> {
        Ok(self.lock()?.deposits.contains_key(tx))
    }

    fn mark_deposit_processed(
        &self,
        tx: &TxHash,
        record: &ProcessedRecord,
    ) -> Result<(), StoreError> {
        // First writer wins; later marks for the same key are no-ops.
        self.lock()?
            .deposits
            .entry(*tx)
            .or_insert_with(|| record.clone());
        Ok(())
    }

    fn deposit_record(&self, tx: &TxHash) -> Result<Option<ProcessedRecord>, StoreError> {
        Ok(self.lock()?.deposits.get(tx).cloned())
    }

    fn is_withdrawal_processed(&self, tx: &TxHash) -> Result<bool, StoreError> {
        Ok(self.lock()?.withdrawals.contains_key(tx))
    }

    fn mark_withdrawal_processed(
        &self,
        tx: &TxHash,
        record: &ProcessedRecord,
    ) -> Result<(), StoreError> {
        self.lock()?
            .withdrawals
            .entry(*tx)
            .or_insert_with(|| record.clone());
        Ok(())
    }

    fn withdrawal_record(&self, tx: &TxHash) -> Result<Option<ProcessedRecord>, StoreError> {
        Ok(self.lock()?.withdrawals.get(tx).cloned())
    }

    fn deposit_count(&self) -> Result<u64, StoreError> {
        Ok(self.lock()?.deposits.len() as u64)
    }

    fn withdrawal_count(&self) -> Result<u64, StoreError> {
        Ok(self.lock()?.withdrawals.len() as u64)
    }
}

impl MappingStore for MemoryStore {
    fn map_identity(
        &self,
        owner: &LedgerAddress,
        account: u32,
        deriver: &dyn AddressDeriver,
    ) -> Result<AddressMapping, StoreError> {
        let mut inner = self.lock()?;

        if let Some(existing) = inner.by_owner.get(owner) {
            return Ok(existing.clone());
        }

        // Index 0 is the wallet's primary address; allocation starts at 1.
        let index = *inner.next_index.get(&account).unwrap_or(&1);
        let deposit_address = deriver.derive(account, index);
        let mapping = AddressMapping {
            account,
            index,
            deposit_address: deposit_address.clone(),
            owner: owner.clone(),
        };

        inner.next_index.insert(account, index + 1);
        inner.by_owner.insert(owner.clone(), mapping.clone());
        inner.by_address.insert(deposit_address, mapping.clone());
        Ok(mapping)
    }

    fn resolve_deposit_address(
        &self,
        address: &CoinAddress,
    ) -> Result<Option<AddressMapping>, StoreError> {
        Ok(self.lock()?.by_address.get(address).cloned())
    }

    fn mapping_for_owner(
        &self,
        owner: &LedgerAddress,
    ) -> Result<Option<AddressMapping>, StoreError> {
        Ok(self.lock()?.by_owner.get(owner).cloned())
    }

    fn next_index(&self, account: u32) -> Result<u32, StoreError> {
        Ok(*self.lock()?.next_index.get(&account).unwrap_or(&1))
    }
}

impl MetaStore for MemoryStore {
    fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.lock()?.meta.insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.lock()?.meta.get(key).cloned())
    }
}
