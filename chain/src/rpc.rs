//! Chain RPC collaborator traits.
//!
//! The actual RPC clients (coin-chain daemon/wallet, host-ledger node)
//! live outside this system; the bridge treats them as opaque query and
//! broadcast services behind these traits. Implementations are expected
//! to be cheap to call repeatedly — the observers poll.

use std::future::Future;

use aqueduct_types::{Amount, CoinAddress, Height, LedgerAddress, SigningMessage, TxHash};

use crate::ChainError;

/// A transfer into one of the bridge's derived deposit addresses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncomingTransfer {
    pub tx_hash: TxHash,
    pub amount: Amount,
    pub height: Height,
    pub deposit_address: CoinAddress,
}

/// A burn of wrapped balance recorded on the host ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BurnRecord {
    pub tx_hash: TxHash,
    pub amount: Amount,
    pub height: Height,
    pub destination: CoinAddress,
    pub requester: LedgerAddress,
}

/// Query/broadcast surface of the coin chain (deposit side; release
/// target).
pub trait CoinChainRpc: Send + Sync + 'static {
    /// Current chain height.
    fn height(&self) -> impl Future<Output = Result<Height, ChainError>> + Send;

    /// Whether the backing daemon has caught up with the network.
    fn is_synchronized(&self) -> impl Future<Output = Result<bool, ChainError>> + Send;

    /// Transfers touching tracked deposit addresses in `[from, to]`.
    fn transfers(
        &self,
        from: Height,
        to: Height,
    ) -> impl Future<Output = Result<Vec<IncomingTransfer>, ChainError>> + Send;

    /// Broadcast a release of the original coin, authorized by the group
    /// signature over `authorization`'s canonical bytes.
    fn broadcast_release(
        &self,
        authorization: &SigningMessage,
        signature: &[u8; 64],
    ) -> impl Future<Output = Result<TxHash, ChainError>> + Send;
}

/// Query/broadcast surface of the host ledger (withdrawal side; mint
/// target).
pub trait HostLedgerRpc: Send + Sync + 'static {
    /// Current ledger height.
    fn height(&self) -> impl Future<Output = Result<Height, ChainError>> + Send;

    /// Whether the backing node has caught up with the network.
    fn is_synchronized(&self) -> impl Future<Output = Result<bool, ChainError>> + Send;

    /// Burns of wrapped balance in `[from, to]`.
    fn burn_events(
        &self,
        from: Height,
        to: Height,
    ) -> impl Future<Output = Result<Vec<BurnRecord>, ChainError>> + Send;

    /// Submit a mint of wrapped balance, authorized by the group
    /// signature over `authorization`'s canonical bytes. The ledger
    /// contract is expected to reject a proof it has already consumed.
    fn mint(
        &self,
        authorization: &SigningMessage,
        signature: &[u8; 64],
    ) -> impl Future<Output = Result<TxHash, ChainError>> + Send;
}
