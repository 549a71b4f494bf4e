//! The transport seam.
//!
//! The orchestrator talks to peers through this trait only, so the TCP
//! transport and the in-process test hub are interchangeable.

use std::future::Future;

use tokio::sync::mpsc;

use aqueduct_types::ParticipantId;

use crate::{BridgeMessage, NetworkError};

/// Verified messages arriving from peers, single consumer.
pub type Inbound = mpsc::Receiver<(ParticipantId, BridgeMessage)>;

/// Outbound surface of the operator transport.
///
/// Delivery is at-least-once and best-effort: an unreachable peer is
/// retried with backoff and, failing that, simply misses the round — the
/// threshold logic absorbs missing contributions, never the transport.
pub trait Transport: Send + Sync + 'static {
    fn send(
        &self,
        to: ParticipantId,
        message: BridgeMessage,
    ) -> impl Future<Output = Result<(), NetworkError>> + Send;

    fn broadcast(
        &self,
        message: BridgeMessage,
    ) -> impl Future<Output = Result<(), NetworkError>> + Send;
}
