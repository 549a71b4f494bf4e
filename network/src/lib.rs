//! Authenticated operator transport for the Aqueduct bridge.
//!
//! Carries protocol rounds and attestations among the fixed,
//! out-of-band-configured set of operator endpoints. No discovery, no NAT
//! traversal: every peer is named in the [`directory::OperatorDirectory`].
//! Every message travels as a signed [`envelope::Envelope`]; receivers
//! verify the sender's identity key before anything is dispatched, and a
//! bounded [`dedup::RoundDedup`] turns the at-least-once delivery into
//! exactly-once processing per protocol round.

pub mod dedup;
pub mod directory;
pub mod envelope;
pub mod error;
pub mod local;
pub mod messages;
pub mod tcp;
pub mod transport;

pub use dedup::RoundDedup;
pub use directory::{OperatorDirectory, OperatorEntry};
pub use envelope::Envelope;
pub use error::NetworkError;
pub use local::LocalHub;
pub use messages::BridgeMessage;
pub use tcp::TcpTransport;
pub use transport::{Inbound, Transport};
