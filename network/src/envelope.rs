//! Signed message envelope.
//!
//! Everything on the wire is `length ‖ bincode(Envelope)`. The signature
//! covers a domain-tagged digest of sender, network, and payload, so an
//! envelope cannot be replayed across deployments or re-attributed to
//! another operator.

use serde::{Deserialize, Serialize};

use aqueduct_crypto::{blake2b_256_multi, sign_message, verify_signature};
use aqueduct_types::{NetworkId, ParticipantId, PrivateKey, Signature};

use crate::{BridgeMessage, NetworkError, OperatorDirectory};

const ENVELOPE_DOMAIN: &[u8] = b"aqueduct/v1/envelope";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    pub sender: ParticipantId,
    pub network: NetworkId,
    /// bincode-encoded [`BridgeMessage`].
    pub payload: Vec<u8>,
    pub signature: Signature,
}

fn digest(sender: ParticipantId, network: NetworkId, payload: &[u8]) -> [u8; 32] {
    blake2b_256_multi(&[
        ENVELOPE_DOMAIN,
        &sender.index().to_be_bytes(),
        &[network.tag()],
        payload,
    ])
}

impl Envelope {
    /// Encode and sign a message for the wire.
    pub fn seal(
        sender: ParticipantId,
        network: NetworkId,
        message: &BridgeMessage,
        identity_key: &PrivateKey,
    ) -> Result<Self, NetworkError> {
        let payload =
            bincode::serialize(message).map_err(|e| NetworkError::Decode(e.to_string()))?;
        let signature = sign_message(&digest(sender, network, &payload), identity_key);
        Ok(Self {
            sender,
            network,
            payload,
            signature,
        })
    }

    /// Verify sender identity and network, then decode the payload.
    ///
    /// An unknown sender, a wrong network, a bad signature, or a payload
    /// that does not parse as a [`BridgeMessage`] all reject the envelope
    /// before anything reaches protocol code.
    pub fn verify_and_open(
        &self,
        directory: &OperatorDirectory,
        network: NetworkId,
    ) -> Result<BridgeMessage, NetworkError> {
        if self.network != network {
            return Err(NetworkError::WrongNetwork);
        }
        let key = directory
            .identity_key(self.sender)
            .ok_or(NetworkError::PeerNotFound(self.sender))?;
        let digest = digest(self.sender, self.network, &self.payload);
        if !verify_signature(&digest, &self.signature, key) {
            return Err(NetworkError::InvalidSignature(self.sender));
        }
        bincode::deserialize(&self.payload).map_err(|e| NetworkError::Decode(e.to_string()))
    }

    pub fn encode(&self) -> Result<Vec<u8>, NetworkError> {
        bincode::serialize(self).map_err(|e| NetworkError::Decode(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, NetworkError> {
        bincode::deserialize(bytes).map_err(|e| NetworkError::Decode(e.to_string()))
    }
}
