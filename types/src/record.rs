//! Durable bookkeeping records.

use serde::{Deserialize, Serialize};

use crate::{Amount, CoinAddress, LedgerAddress, Timestamp, TxHash};

/// The write-once record proving a source event was acted on.
///
/// Keyed by the source transaction hash in its table (deposits and
/// withdrawals are kept apart). Its presence *is* the at-most-once
/// guarantee: a key is marked only after the counterpart action was
/// submitted at least once.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedRecord {
    /// Amount moved, in atomic units.
    pub amount: Amount,
    /// Transaction hash of the counterpart action (mint or release).
    pub counterpart_tx: TxHash,
    /// When the record was written.
    pub processed_at: Timestamp,
}

/// The durable link between a derived deposit address and its owner on the
/// host ledger.
///
/// `(account, index)`, `deposit_address`, and `owner` are each unique;
/// indices within an account strictly increase and are never reused.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressMapping {
    /// Wallet account the subaddress was derived under.
    pub account: u32,
    /// Derivation index within the account.
    pub index: u32,
    /// The derived coin-chain deposit address.
    pub deposit_address: CoinAddress,
    /// The host-ledger identity that owns deposits to this address.
    pub owner: LedgerAddress,
}
