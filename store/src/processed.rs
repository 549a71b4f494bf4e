//! Processed-record storage trait.

use aqueduct_types::{ProcessedRecord, TxHash};

use crate::StoreError;

/// Trait for the write-once processed-record tables.
///
/// Deposits (keyed by coin-chain tx hash) and withdrawals (keyed by
/// host-ledger burn tx hash) live in separate tables. Marking an
/// already-marked key is a no-op that still reports success, so duplicate
/// deliveries and concurrent marks collapse to exactly one record.
pub trait ProcessedStore {
    /// Whether a deposit has already been acted on.
    fn is_deposit_processed(&self, tx: &TxHash) -> Result<bool, StoreError>;

    /// Record that a deposit's mint was submitted. Write-once.
    fn mark_deposit_processed(
        &self,
        tx: &TxHash,
        record: &ProcessedRecord,
    ) -> Result<(), StoreError>;

    /// Read a deposit's record, if any (status surface).
    fn deposit_record(&self, tx: &TxHash) -> Result<Option<ProcessedRecord>, StoreError>;

    /// Whether a withdrawal has already been acted on.
    fn is_withdrawal_processed(&self, tx: &TxHash) -> Result<bool, StoreError>;

    /// Record that a withdrawal's release was submitted. Write-once.
    fn mark_withdrawal_processed(
        &self,
        tx: &TxHash,
        record: &ProcessedRecord,
    ) -> Result<(), StoreError>;

    /// Read a withdrawal's record, if any (status surface).
    fn withdrawal_record(&self, tx: &TxHash) -> Result<Option<ProcessedRecord>, StoreError>;

    /// Total processed deposits.
    fn deposit_count(&self) -> Result<u64, StoreError>;

    /// Total processed withdrawals.
    fn withdrawal_count(&self) -> Result<u64, StoreError>;
}
