//! Aqueduct bridge operator node.
//!
//! Wires the pieces into one process: LMDB-backed bookkeeping, the two
//! chain observers, the operator transport, the threshold signer, and the
//! orchestration loop that turns confirmed events into jointly-authorized
//! chain actions exactly once each.

pub mod attestation;
pub mod config;
pub mod deriver;
pub mod dkg_runner;
pub mod error;
pub mod node;
pub mod shutdown;

pub use attestation::ObservedRegistry;
pub use config::{BridgeConfig, RosterEntry};
pub use deriver::DigestDeriver;
pub use dkg_runner::{establish_group_key, load_or_establish_group_key};
pub use error::BridgeError;
pub use node::BridgeNode;
pub use shutdown::ShutdownController;
