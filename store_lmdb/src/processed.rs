//! LMDB implementation of ProcessedStore.

use aqueduct_store::{ProcessedStore, StoreError};
use aqueduct_types::{ProcessedRecord, TxHash};
use heed::types::Bytes;
use heed::Database;

use crate::environment::LmdbStore;
use crate::LmdbError;

impl LmdbStore {
    fn is_processed_in(
        &self,
        db: Database<Bytes, Bytes>,
        tx: &TxHash,
    ) -> Result<bool, StoreError> {
        let rtxn = self.env().read_txn().map_err(LmdbError::from)?;
        let found = db
            .get(&rtxn, tx.as_bytes())
            .map_err(LmdbError::from)?
            .is_some();
        Ok(found)
    }

    /// Write-once insert: the first record for a key sticks, later marks
    /// commit nothing. Runs in a single write transaction, so two
    /// concurrent marks serialize and both return success.
    fn mark_in(
        &self,
        db: Database<Bytes, Bytes>,
        tx: &TxHash,
        record: &ProcessedRecord,
    ) -> Result<(), StoreError> {
        let mut wtxn = self.env().write_txn().map_err(LmdbError::from)?;
        if db
            .get(&wtxn, tx.as_bytes())
            .map_err(LmdbError::from)?
            .is_some()
        {
            return Ok(());
        }
        let value = bincode::serialize(record)
            .map_err(|e| LmdbError::Serialization(e.to_string()))
            .map_err(StoreError::from)?;
        db.put(&mut wtxn, tx.as_bytes(), &value)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn record_in(
        &self,
        db: Database<Bytes, Bytes>,
        tx: &TxHash,
    ) -> Result<Option<ProcessedRecord>, StoreError> {
        let rtxn = self.env().read_txn().map_err(LmdbError::from)?;
        match db.get(&rtxn, tx.as_bytes()).map_err(LmdbError::from)? {
            None => Ok(None),
            Some(bytes) => {
                let record = bincode::deserialize(bytes)
                    .map_err(|e| StoreError::Corruption(e.to_string()))?;
                Ok(Some(record))
            }
        }
    }

    fn count_in(&self, db: Database<Bytes, Bytes>) -> Result<u64, StoreError> {
        let rtxn = self.env().read_txn().map_err(LmdbError::from)?;
        Ok(db.len(&rtxn).map_err(LmdbError::from)?)
    }
}

impl ProcessedStore for LmdbStore {
    fn is_deposit_processed(&self, tx: &TxHash) -> Result<bool, StoreError> {
        self.is_processed_in(self.processed_deposits, tx)
    }

    fn mark_deposit_processed(
        &self,
        tx: &TxHash,
        record: &ProcessedRecord,
    ) -> Result<(), StoreError> {
        self.mark_in(self.processed_deposits, tx, record)
    }

    fn deposit_record(&self, tx: &TxHash) -> Result<Option<ProcessedRecord>, StoreError> {
        self.record_in(self.processed_deposits, tx)
    }

    fn is_withdrawal_processed(&self, tx: &TxHash) -> Result<bool, StoreError> {
        self.is_processed_in(self.processed_withdrawals, tx)
    }

    fn mark_withdrawal_processed(
        &self,
        tx: &TxHash,
        record: &ProcessedRecord,
    ) -> Result<(), StoreError> {
        self.mark_in(self.processed_withdrawals, tx, record)
    }

    fn withdrawal_record(&self, tx: &TxHash) -> Result<Option<ProcessedRecord>, StoreError> {
        self.record_in(self.processed_withdrawals, tx)
    }

    fn deposit_count(&self) -> Result<u64, StoreError> {
        self.count_in(self.processed_deposits)
    }

    fn withdrawal_count(&self) -> Result<u64, StoreError> {
        self.count_in(self.processed_withdrawals)
    }
}
