//! Fundamental types for the Aqueduct bridge.
//!
//! This crate defines the core types shared across every other crate in the
//! workspace: hashes, amounts, chain addresses, operator identifiers, the
//! observed-event model, and the canonical signing-message encoding.

pub mod address;
pub mod amount;
pub mod event;
pub mod hash;
pub mod keys;
pub mod message;
pub mod network;
pub mod participant;
pub mod record;
pub mod time;

pub use address::{CoinAddress, LedgerAddress};
pub use amount::Amount;
pub use event::{BridgeStatus, DepositEvent, WithdrawalRequest};
pub use hash::{Height, TxHash};
pub use keys::{KeyPair, PrivateKey, PublicKey, Signature};
pub use message::{Intent, SigningMessage};
pub use network::NetworkId;
pub use participant::{ParticipantId, SessionId};
pub use record::{AddressMapping, ProcessedRecord};
pub use time::Timestamp;
