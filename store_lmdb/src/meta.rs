//! LMDB implementation of MetaStore.

use aqueduct_store::{MetaStore, StoreError};

use crate::environment::LmdbStore;
use crate::LmdbError;

impl MetaStore for LmdbStore {
    fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut wtxn = self.env().write_txn().map_err(LmdbError::from)?;
        self.meta
            .put(&mut wtxn, key.as_bytes(), value)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let rtxn = self.env().read_txn().map_err(LmdbError::from)?;
        let val = self
            .meta
            .get(&rtxn, key.as_bytes())
            .map_err(LmdbError::from)?
            .map(|v| v.to_vec());
        Ok(val)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::DEFAULT_MAP_SIZE;
    use aqueduct_store::{
        AddressDeriver, MappingStore, ProcessedStore, DEPOSIT_WATERMARK,
    };
    use aqueduct_types::{Amount, CoinAddress, LedgerAddress, ProcessedRecord, Timestamp, TxHash};

    struct TestDeriver;

    impl AddressDeriver for TestDeriver {
        fn derive(&self, account: u32, index: u32) -> CoinAddress {
            CoinAddress::new(format!("sub-{account}-{index}"))
        }
    }

    fn temp_store() -> (tempfile::TempDir, LmdbStore) {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = LmdbStore::open(dir.path(), DEFAULT_MAP_SIZE).expect("open store");
        (dir, store)
    }

    fn record() -> ProcessedRecord {
        ProcessedRecord {
            amount: Amount::new(2_500_000),
            counterpart_tx: TxHash::new([9; 32]),
            processed_at: Timestamp::new(1_700_000_000),
        }
    }

    #[test]
    fn meta_roundtrip() {
        let (_dir, store) = temp_store();
        assert_eq!(store.get_meta("missing").unwrap(), None);

        store.put_meta("k", b"v").unwrap();
        assert_eq!(store.get_meta("k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn mark_deposit_is_write_once() {
        let (_dir, store) = temp_store();
        let tx = TxHash::new([1; 32]);

        store.mark_deposit_processed(&tx, &record()).unwrap();
        let mut second = record();
        second.counterpart_tx = TxHash::new([7; 32]);
        store.mark_deposit_processed(&tx, &second).unwrap();

        let kept = store.deposit_record(&tx).unwrap().unwrap();
        assert_eq!(kept.counterpart_tx, TxHash::new([9; 32]));
        assert_eq!(store.deposit_count().unwrap(), 1);
    }

    #[test]
    fn mapping_allocation_survives_reopen() {
        let dir = tempfile::tempdir().expect("temp dir");
        let owner = LedgerAddress::new("ldgr1alice");

        {
            let store = LmdbStore::open(dir.path(), DEFAULT_MAP_SIZE).unwrap();
            let m = store.map_identity(&owner, 0, &TestDeriver).unwrap();
            assert_eq!(m.index, 1);
        }

        // Reopen: the existing mapping resolves, the counter moves on.
        let store = LmdbStore::open(dir.path(), DEFAULT_MAP_SIZE).unwrap();
        let again = store.map_identity(&owner, 0, &TestDeriver).unwrap();
        assert_eq!(again.index, 1);

        let other = store
            .map_identity(&LedgerAddress::new("ldgr1bob"), 0, &TestDeriver)
            .unwrap();
        assert_eq!(other.index, 2);

        let resolved = store
            .resolve_deposit_address(&CoinAddress::new("sub-0-1"))
            .unwrap()
            .unwrap();
        assert_eq!(resolved.owner, owner);
    }

    #[test]
    fn watermark_survives_reopen() {
        let dir = tempfile::tempdir().expect("temp dir");

        {
            let store = LmdbStore::open(dir.path(), DEFAULT_MAP_SIZE).unwrap();
            store.set_watermark(DEPOSIT_WATERMARK, 123_456).unwrap();
        }

        let store = LmdbStore::open(dir.path(), DEFAULT_MAP_SIZE).unwrap();
        assert_eq!(store.watermark(DEPOSIT_WATERMARK).unwrap(), Some(123_456));
    }
}
