//! Typed messages exchanged between operators.

use serde::{Deserialize, Serialize};

use aqueduct_types::{
    Amount, DepositEvent, Intent, ParticipantId, SessionId, SigningMessage, TxHash,
    WithdrawalRequest,
};

/// Every payload the operator transport carries.
///
/// Threshold-protocol packages travel as opaque bytes in their crate's
/// canonical serialization; the schema here is what gets validated at the
/// transport boundary.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum BridgeMessage {
    /// Coordinator announces a DKG ceremony (or a restart with the
    /// surviving roster).
    DkgStart {
        ceremony: SessionId,
        roster: Vec<ParticipantId>,
        threshold: u16,
    },
    /// DKG round 1: broadcast polynomial commitment + proof of knowledge.
    DkgRound1 { ceremony: SessionId, package: Vec<u8> },
    /// DKG round 2: private share evaluation for the recipient.
    DkgRound2 { ceremony: SessionId, package: Vec<u8> },
    /// Coordinator opens a signing session for an authorization.
    SigningRequest {
        session: SessionId,
        message: SigningMessage,
        deadline_secs: u64,
    },
    /// Participant's one-time nonce commitment (signing round 1).
    SigningCommitment { session: SessionId, commitment: Vec<u8> },
    /// Coordinator's sealed commitment set + message (signing round 2).
    SigningPackage { session: SessionId, package: Vec<u8> },
    /// Participant's signature share.
    SignatureShare { session: SessionId, share: Vec<u8> },
    /// Participant refused the message binding for a session.
    SigningRefusal { session: SessionId },
    /// An operator observed a deposit as confirmed.
    DepositAttestation { event: DepositEvent },
    /// An operator observed a burn as confirmed.
    WithdrawalAttestation { request: WithdrawalRequest },
    /// Coordinator completed the chain action for a source event; peers
    /// record it locally so every store converges.
    ProcessedNotice {
        intent: Intent,
        source_tx: TxHash,
        counterpart_tx: TxHash,
        amount: Amount,
    },
}

impl BridgeMessage {
    /// Short tag for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DkgStart { .. } => "dkg_start",
            Self::DkgRound1 { .. } => "dkg_round1",
            Self::DkgRound2 { .. } => "dkg_round2",
            Self::SigningRequest { .. } => "signing_request",
            Self::SigningCommitment { .. } => "signing_commitment",
            Self::SigningPackage { .. } => "signing_package",
            Self::SignatureShare { .. } => "signature_share",
            Self::SigningRefusal { .. } => "signing_refusal",
            Self::DepositAttestation { .. } => "deposit_attestation",
            Self::WithdrawalAttestation { .. } => "withdrawal_attestation",
            Self::ProcessedNotice { .. } => "processed_notice",
        }
    }

    /// Dedup coordinates: `(scope, sender, round)` uniquely identifies one
    /// delivery obligation. Protocol rounds use their session id as the
    /// scope; attestations and notices use their source tx hash.
    pub fn dedup_key(&self, sender: ParticipantId) -> ([u8; 32], ParticipantId, u8) {
        let (scope, round) = match self {
            Self::DkgStart { ceremony, .. } => (*ceremony.as_bytes(), 0),
            Self::DkgRound1 { ceremony, .. } => (*ceremony.as_bytes(), 1),
            Self::DkgRound2 { ceremony, .. } => (*ceremony.as_bytes(), 2),
            Self::SigningRequest { session, .. } => (*session.as_bytes(), 3),
            Self::SigningCommitment { session, .. } => (*session.as_bytes(), 4),
            Self::SigningPackage { session, .. } => (*session.as_bytes(), 5),
            Self::SignatureShare { session, .. } => (*session.as_bytes(), 6),
            Self::SigningRefusal { session } => (*session.as_bytes(), 7),
            Self::DepositAttestation { event } => (*event.tx_hash.as_bytes(), 8),
            Self::WithdrawalAttestation { request } => (*request.tx_hash.as_bytes(), 9),
            Self::ProcessedNotice { source_tx, intent, .. } => {
                (*source_tx.as_bytes(), 10 + *intent as u8)
            }
        };
        (scope, sender, round)
    }
}
