//! Confirmation-gated chain observation for the Aqueduct bridge.
//!
//! Turns the raw streams of both chains into confirmed, de-duplicated
//! events delivered exactly once per process across restarts. The chain
//! RPC clients themselves are external collaborators, modelled as traits
//! in [`rpc`]; one generic polling engine in [`observer`] serves both the
//! deposit side (coin-chain transfers) and the withdrawal side
//! (host-ledger burns) via the sources in [`sources`].

pub mod error;
pub mod observer;
pub mod rpc;
pub mod sources;

pub use error::ChainError;
pub use observer::{ChainObserver, EventSource, ObserverConfig, ScanItem, Side};
pub use rpc::{BurnRecord, CoinChainRpc, HostLedgerRpc, IncomingTransfer};
pub use sources::{DepositSource, WithdrawalSource};
