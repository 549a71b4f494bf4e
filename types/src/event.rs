//! Observed chain events and bridge status.

use serde::{Deserialize, Serialize};

use crate::{Amount, CoinAddress, Height, LedgerAddress, TxHash};

/// A confirmed incoming transfer on the coin chain, destined to be minted
/// as wrapped balance on the host ledger.
///
/// Immutable once observed; only `confirmations` is recomputed each poll
/// cycle until the event clears the confirmation gate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositEvent {
    /// Coin-chain transaction hash — the idempotency key for the mint.
    pub tx_hash: TxHash,
    /// Deposited amount in atomic units.
    pub amount: Amount,
    /// Height the transaction was included at.
    pub height: Height,
    /// Confirmations at observation time.
    pub confirmations: u64,
    /// The derived deposit address the transfer paid into.
    pub deposit_address: CoinAddress,
}

/// A confirmed burn on the host ledger requesting release of the original
/// coin.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    /// Host-ledger transaction hash of the burn — the idempotency key for
    /// the release.
    pub tx_hash: TxHash,
    /// Burned amount in atomic units.
    pub amount: Amount,
    /// Coin-chain address the user asked to be paid at.
    pub destination: CoinAddress,
    /// The ledger account that burned the wrapped balance.
    pub requester: LedgerAddress,
}

/// Operational status of the bridge process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BridgeStatus {
    Initializing,
    Running,
    Paused,
    Error,
}

impl BridgeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Error => "error",
        }
    }
}
