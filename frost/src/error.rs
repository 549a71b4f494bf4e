use thiserror::Error;

use aqueduct_types::{ParticipantId, SessionId};

#[derive(Debug, Error)]
pub enum FrostError {
    #[error("threshold {threshold} is invalid for a group of {total}")]
    InvalidThreshold { threshold: u16, total: u16 },

    #[error("participant {0} is not part of this ceremony")]
    UnknownParticipant(ParticipantId),

    #[error("participant {0} already delivered a package for this round")]
    DuplicatePackage(ParticipantId),

    #[error("ceremony is not in the right round for this message")]
    WrongRound,

    #[error("DKG cannot continue: {surviving} participants remain, threshold is {threshold}")]
    DkgBelowThreshold { surviving: u16, threshold: u16 },

    #[error("nonces for session {0} were already committed")]
    NonceReuse(SessionId),

    #[error("no pending nonces for session {0}")]
    UnknownSession(SessionId),

    #[error("signing package message does not match the observed event")]
    MessageMismatch,

    #[error("session is in a terminal state")]
    SessionClosed,

    #[error("malformed protocol payload: {0}")]
    Decode(String),

    #[error("threshold protocol error: {0}")]
    Protocol(#[from] frost_ed25519::Error),
}
