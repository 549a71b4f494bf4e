use thiserror::Error;

use aqueduct_types::ParticipantId;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("operator {0} is not in the directory")]
    PeerNotFound(ParticipantId),

    #[error("envelope signature from {0} is invalid")]
    InvalidSignature(ParticipantId),

    #[error("envelope is for a different network")]
    WrongNetwork,

    #[error("malformed frame: {0}")]
    Decode(String),

    #[error("inbound channel closed")]
    ChannelClosed,

    #[error("IO error: {0}")]
    Io(String),
}
