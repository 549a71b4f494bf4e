//! LMDB implementation of MappingStore.

use aqueduct_store::{AddressDeriver, MappingStore, StoreError};
use aqueduct_types::{AddressMapping, CoinAddress, LedgerAddress};

use crate::environment::LmdbStore;
use crate::LmdbError;

fn key_bytes(account: u32, index: u32) -> [u8; 8] {
    let mut key = [0u8; 8];
    key[..4].copy_from_slice(&account.to_be_bytes());
    key[4..].copy_from_slice(&index.to_be_bytes());
    key
}

fn next_index_key(account: u32) -> String {
    format!("next_index_{account}")
}

fn encode(mapping: &AddressMapping) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(mapping)
        .map_err(|e| LmdbError::Serialization(e.to_string()))
        .map_err(StoreError::from)
}

fn decode(bytes: &[u8]) -> Result<AddressMapping, StoreError> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Corruption(e.to_string()))
}

impl MappingStore for LmdbStore {
    fn map_identity(
        &self,
        owner: &LedgerAddress,
        account: u32,
        deriver: &dyn AddressDeriver,
    ) -> Result<AddressMapping, StoreError> {
        let mut wtxn = self.env().write_txn().map_err(LmdbError::from)?;

        // Idempotence: an owner that already has a mapping gets it back.
        if let Some(bytes) = self
            .mappings_by_owner
            .get(&wtxn, owner.as_str().as_bytes())
            .map_err(LmdbError::from)?
        {
            return decode(bytes);
        }

        // Allocate the next index. The counter lives in the meta table and
        // only ever moves forward, so indices are never reused even if a
        // mapping were ever deleted.
        let counter_key = next_index_key(account);
        let index = match self
            .meta
            .get(&wtxn, counter_key.as_bytes())
            .map_err(LmdbError::from)?
        {
            // Index 0 is the wallet's primary address; allocation starts at 1.
            None => 1u32,
            Some(bytes) => {
                let arr: [u8; 4] = bytes.try_into().map_err(|_| {
                    StoreError::Corruption(format!("counter '{counter_key}' has unexpected length"))
                })?;
                u32::from_le_bytes(arr)
            }
        };

        let deposit_address = deriver.derive(account, index);
        let mapping = AddressMapping {
            account,
            index,
            deposit_address: deposit_address.clone(),
            owner: owner.clone(),
        };
        let value = encode(&mapping)?;

        self.mappings_by_key
            .put(&mut wtxn, &key_bytes(account, index), &value)
            .map_err(LmdbError::from)?;
        self.mappings_by_address
            .put(&mut wtxn, deposit_address.as_str().as_bytes(), &value)
            .map_err(LmdbError::from)?;
        self.mappings_by_owner
            .put(&mut wtxn, owner.as_str().as_bytes(), &value)
            .map_err(LmdbError::from)?;
        self.meta
            .put(
                &mut wtxn,
                counter_key.as_bytes(),
                &(index + 1).to_le_bytes(),
            )
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;

        tracing::debug!(owner = %mapping.owner, index, "allocated deposit address");
        Ok(mapping)
    }

    fn resolve_deposit_address(
        &self,
        address: &CoinAddress,
    ) -> Result<Option<AddressMapping>, StoreError> {
        let rtxn = self.env().read_txn().map_err(LmdbError::from)?;
        match self
            .mappings_by_address
            .get(&rtxn, address.as_str().as_bytes())
            .map_err(LmdbError::from)?
        {
            None => Ok(None),
            Some(bytes) => Ok(Some(decode(bytes)?)),
        }
    }

    fn mapping_for_owner(
        &self,
        owner: &LedgerAddress,
    ) -> Result<Option<AddressMapping>, StoreError> {
        let rtxn = self.env().read_txn().map_err(LmdbError::from)?;
        match self
            .mappings_by_owner
            .get(&rtxn, owner.as_str().as_bytes())
            .map_err(LmdbError::from)?
        {
            None => Ok(None),
            Some(bytes) => Ok(Some(decode(bytes)?)),
        }
    }

    fn next_index(&self, account: u32) -> Result<u32, StoreError> {
        let rtxn = self.env().read_txn().map_err(LmdbError::from)?;
        match self
            .meta
            .get(&rtxn, next_index_key(account).as_bytes())
            .map_err(LmdbError::from)?
        {
            None => Ok(1),
            Some(bytes) => {
                let arr: [u8; 4] = bytes
                    .try_into()
                    .map_err(|_| StoreError::Corruption("next_index length".into()))?;
                Ok(u32::from_le_bytes(arr))
            }
        }
    }
}
