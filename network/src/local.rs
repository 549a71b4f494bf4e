//! In-process transport for multi-operator tests.
//!
//! Routes messages between operators over channels, skipping sockets and
//! envelope signatures entirely — those have their own tests. Dropping an
//! operator from the hub makes it unreachable, which is how tests model
//! an offline peer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use aqueduct_types::ParticipantId;

use crate::transport::{Inbound, Transport};
use crate::{BridgeMessage, NetworkError};

/// Channel hub connecting every in-process operator.
#[derive(Default)]
pub struct LocalHub {
    peers: Mutex<HashMap<ParticipantId, mpsc::Sender<(ParticipantId, BridgeMessage)>>>,
}

impl LocalHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register an operator; returns its transport handle and inbound
    /// stream.
    pub fn join(self: &Arc<Self>, id: ParticipantId) -> (LocalTransport, Inbound) {
        let (tx, rx) = mpsc::channel(256);
        self.peers.lock().expect("hub lock").insert(id, tx);
        (
            LocalTransport {
                hub: Arc::clone(self),
                id,
            },
            rx,
        )
    }

    /// Take an operator offline: messages to it vanish, like an
    /// unreachable endpoint.
    pub fn disconnect(&self, id: ParticipantId) {
        self.peers.lock().expect("hub lock").remove(&id);
    }
}

/// One operator's handle onto the hub.
#[derive(Clone)]
pub struct LocalTransport {
    hub: Arc<LocalHub>,
    id: ParticipantId,
}

impl LocalTransport {
    pub fn local(&self) -> ParticipantId {
        self.id
    }
}

impl Transport for LocalTransport {
    async fn send(&self, to: ParticipantId, message: BridgeMessage) -> Result<(), NetworkError> {
        let target = {
            let peers = self.hub.peers.lock().expect("hub lock");
            peers.get(&to).cloned()
        };
        match target {
            Some(tx) => tx
                .send((self.id, message))
                .await
                .map_err(|_| NetworkError::ChannelClosed),
            // Offline peer: it just misses the round.
            None => Ok(()),
        }
    }

    async fn broadcast(&self, message: BridgeMessage) -> Result<(), NetworkError> {
        let targets: Vec<_> = {
            let peers = self.hub.peers.lock().expect("hub lock");
            peers
                .iter()
                .filter(|(id, _)| **id != self.id)
                .map(|(_, tx)| tx.clone())
                .collect()
        };
        for tx in targets {
            let _ = tx.send((self.id, message.clone())).await;
        }
        Ok(())
    }
}
