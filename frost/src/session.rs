//! Coordinator-side signing session.
//!
//! One [`SigningCoordinator`] per authorization attempt. The session walks
//! `CollectingCommitments → CommitmentsComplete → CollectingShares →
//! Aggregated → Verified`, or lands in `Aborted` and stays there; a retry
//! is always a fresh session with fresh nonces.

use std::collections::BTreeMap;

use frost_ed25519 as frost;

use aqueduct_types::{ParticipantId, SessionId, Timestamp};

use crate::dkg::identifier;
use crate::signer::GroupPublic;
use crate::FrostError;

/// Why a session ended without a signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AbortReason {
    /// The deadline passed while waiting for shares.
    Timeout,
    /// The deadline passed with fewer than `threshold` commitments.
    InsufficientShares,
    /// Aggregation produced a signature the group key rejects, or a share
    /// failed validation.
    VerificationFailed,
    /// A participant refused the message binding.
    MessageMismatch,
}

/// Lifecycle of one signing session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    CollectingCommitments,
    CommitmentsComplete,
    CollectingShares,
    Aggregated,
    Verified,
    Aborted(AbortReason),
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Verified | Self::Aborted(_))
    }
}

/// The coordinator's state for one signing session.
///
/// The signing set is the first `threshold` participants whose nonce
/// commitments arrive; everyone in that set must then deliver a share.
pub struct SigningCoordinator {
    session: SessionId,
    message: Vec<u8>,
    threshold: u16,
    group: GroupPublic,
    deadline: Timestamp,
    state: SessionState,
    commitments: BTreeMap<ParticipantId, Vec<u8>>,
    package: Option<frost::SigningPackage>,
    shares: BTreeMap<ParticipantId, Vec<u8>>,
    signature: Option<[u8; 64]>,
}

impl SigningCoordinator {
    pub fn new(
        session: SessionId,
        message: Vec<u8>,
        threshold: u16,
        group: GroupPublic,
        deadline: Timestamp,
    ) -> Result<Self, FrostError> {
        let floor = match group {
            GroupPublic::Solo(_) => 1,
            GroupPublic::Frost(_) => 2,
        };
        if threshold < floor {
            return Err(FrostError::InvalidThreshold {
                threshold,
                total: floor,
            });
        }
        Ok(Self {
            session,
            message,
            threshold,
            group,
            deadline,
            state: SessionState::CollectingCommitments,
            commitments: BTreeMap::new(),
            package: None,
            shares: BTreeMap::new(),
            signature: None,
        })
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn message(&self) -> &[u8] {
        &self.message
    }

    /// The signature, once the session reached `Verified`.
    pub fn signature(&self) -> Option<&[u8; 64]> {
        self.signature.as_ref()
    }

    /// The participants whose commitments form the signing set.
    pub fn signing_set(&self) -> impl Iterator<Item = ParticipantId> + '_ {
        self.commitments.keys().copied()
    }

    /// Round 1: record a participant's nonce commitment.
    ///
    /// When the `threshold`-th commitment arrives the set is sealed and
    /// the serialized signing package to broadcast is returned. Later
    /// commitments are dropped silently — the set already formed.
    pub fn add_commitment(
        &mut self,
        from: ParticipantId,
        commitment: &[u8],
    ) -> Result<Option<Vec<u8>>, FrostError> {
        match self.state {
            SessionState::CollectingCommitments => {}
            SessionState::CollectingShares => return Ok(None),
            _ => return Err(FrostError::SessionClosed),
        }
        if self.commitments.contains_key(&from) {
            return Err(FrostError::DuplicatePackage(from));
        }

        // Validate eagerly so a malformed commitment can't poison sealing.
        if matches!(self.group, GroupPublic::Frost(_)) {
            frost::round1::SigningCommitments::deserialize(commitment)
                .map_err(|e| FrostError::Decode(e.to_string()))?;
        }
        self.commitments.insert(from, commitment.to_vec());

        if self.commitments.len() < self.threshold as usize {
            return Ok(None);
        }

        self.state = SessionState::CommitmentsComplete;
        let package = self.seal_package()?;
        self.state = SessionState::CollectingShares;
        tracing::debug!(session = %self.session, signers = self.commitments.len(),
            "signing set sealed");
        Ok(Some(package))
    }

    fn seal_package(&mut self) -> Result<Vec<u8>, FrostError> {
        match &self.group {
            GroupPublic::Frost(_) => {
                let mut map = BTreeMap::new();
                for (pid, bytes) in &self.commitments {
                    let commitments = frost::round1::SigningCommitments::deserialize(bytes)
                        .map_err(|e| FrostError::Decode(e.to_string()))?;
                    map.insert(identifier(*pid)?, commitments);
                }
                let package = frost::SigningPackage::new(map, &self.message);
                let bytes = package
                    .serialize()
                    .map_err(|e| FrostError::Decode(e.to_string()))?;
                self.package = Some(package);
                Ok(bytes)
            }
            // Solo: the "package" is the message itself.
            GroupPublic::Solo(_) => Ok(self.message.clone()),
        }
    }

    /// Round 2: record a signature share from a member of the signing set.
    ///
    /// When the last member's share arrives, aggregation runs and the
    /// result is verified under the group key before the session reports
    /// `Verified`. Returns the aggregate signature at that point.
    pub fn add_share(
        &mut self,
        from: ParticipantId,
        share: &[u8],
    ) -> Result<Option<[u8; 64]>, FrostError> {
        if self.state != SessionState::CollectingShares {
            return Err(FrostError::SessionClosed);
        }
        if !self.commitments.contains_key(&from) {
            return Err(FrostError::UnknownParticipant(from));
        }
        if self.shares.contains_key(&from) {
            return Err(FrostError::DuplicatePackage(from));
        }
        self.shares.insert(from, share.to_vec());

        if self.shares.len() < self.commitments.len() {
            return Ok(None);
        }

        self.state = SessionState::Aggregated;
        match self.aggregate() {
            Ok(signature) => {
                if self.group.verify(&self.message, &signature) {
                    self.signature = Some(signature);
                    self.state = SessionState::Verified;
                    tracing::info!(session = %self.session, "signature verified");
                    Ok(Some(signature))
                } else {
                    self.state = SessionState::Aborted(AbortReason::VerificationFailed);
                    Err(FrostError::Decode(
                        "aggregate signature rejected by group key".into(),
                    ))
                }
            }
            Err(e) => {
                self.state = SessionState::Aborted(AbortReason::VerificationFailed);
                Err(e)
            }
        }
    }

    fn aggregate(&self) -> Result<[u8; 64], FrostError> {
        match &self.group {
            GroupPublic::Frost(group) => {
                let package = self.package.as_ref().ok_or(FrostError::WrongRound)?;
                let mut map = BTreeMap::new();
                for (pid, bytes) in &self.shares {
                    let share = frost::round2::SignatureShare::deserialize(bytes)
                        .map_err(|e| FrostError::Decode(e.to_string()))?;
                    map.insert(identifier(*pid)?, share);
                }
                let signature = frost::aggregate(package, &map, group)?;
                let bytes = signature
                    .serialize()
                    .map_err(|e| FrostError::Decode(e.to_string()))?;
                bytes
                    .try_into()
                    .map_err(|_| FrostError::Decode("aggregate signature length".into()))
            }
            GroupPublic::Solo(_) => {
                let share = self.shares.values().next().ok_or(FrostError::WrongRound)?;
                share
                    .as_slice()
                    .try_into()
                    .map_err(|_| FrostError::Decode("solo signature length".into()))
            }
        }
    }

    /// Mark the session aborted because a participant reported a message
    /// mismatch — a forged or stale request.
    pub fn abort_mismatch(&mut self) {
        if !self.state.is_terminal() {
            self.state = SessionState::Aborted(AbortReason::MessageMismatch);
        }
    }

    /// Apply the deadline. Returns `true` if this call aborted the
    /// session.
    pub fn expire(&mut self, now: Timestamp) -> bool {
        if self.state.is_terminal() || now < self.deadline {
            return false;
        }
        let reason = if self.state == SessionState::CollectingCommitments {
            AbortReason::InsufficientShares
        } else {
            AbortReason::Timeout
        };
        self.state = SessionState::Aborted(reason);
        tracing::warn!(session = %self.session, ?reason, "signing session expired");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dkg::run_test_ceremony;
    use crate::signer::{GroupSigner, ShareHolder};
    use rand::rngs::OsRng;

    fn sid(b: u8) -> SessionId {
        SessionId::new([b; 32])
    }

    fn pid(i: u16) -> ParticipantId {
        ParticipantId::new(i).unwrap()
    }

    fn holders(n: u16, threshold: u16) -> Vec<(ParticipantId, ShareHolder)> {
        run_test_ceremony(n, threshold)
            .into_iter()
            .map(|(id, share)| (id, ShareHolder::new(GroupSigner::Threshold(share))))
            .collect()
    }

    /// Run one session with the given subset of holders signing.
    fn run_session(
        holders: &mut [(ParticipantId, ShareHolder)],
        signers: &[u16],
        threshold: u16,
        message: &[u8],
    ) -> Result<(SigningCoordinator, Option<[u8; 64]>), FrostError> {
        let group = holders[0].1.group_public();
        let mut coordinator = SigningCoordinator::new(
            sid(0xA0),
            message.to_vec(),
            threshold,
            group,
            Timestamp::new(u64::MAX),
        )?;

        let mut package = None;
        for (id, holder) in holders.iter_mut() {
            if !signers.contains(&id.index()) {
                continue;
            }
            let commitment = holder.commit(sid(0xA0), &mut OsRng)?;
            if let Some(p) = coordinator.add_commitment(*id, &commitment)? {
                package = Some(p);
            }
        }
        let Some(package) = package else {
            return Ok((coordinator, None));
        };

        let mut signature = None;
        let set: Vec<ParticipantId> = coordinator.signing_set().collect();
        for (id, holder) in holders.iter_mut() {
            if !set.contains(id) {
                continue;
            }
            let share = holder.sign(sid(0xA0), &package, message)?;
            if let Some(sig) = coordinator.add_share(*id, &share)? {
                signature = Some(sig);
            }
        }
        Ok((coordinator, signature))
    }

    #[test]
    fn two_of_three_reaches_verified() {
        let mut hs = holders(3, 2);
        let group = hs[0].1.group_public();
        // Participant 3 is offline; {1, 2} still sign.
        let (coordinator, sig) = run_session(&mut hs, &[1, 2], 2, b"mint 5000 to alice").unwrap();

        assert_eq!(coordinator.state(), SessionState::Verified);
        let sig = sig.expect("aggregate signature");
        assert!(group.verify(b"mint 5000 to alice", &sig));
        assert_eq!(coordinator.signature(), Some(&sig));
    }

    #[test]
    fn all_three_of_three_also_verifies() {
        // k = N: the sealed set is the first T responders, the rest are
        // silently dropped, and the session still verifies.
        let mut hs = holders(3, 2);
        let group = hs[0].1.group_public();
        let (coordinator, sig) = run_session(&mut hs, &[1, 2, 3], 2, b"payload").unwrap();
        assert_eq!(coordinator.state(), SessionState::Verified);
        assert!(group.verify(b"payload", &sig.unwrap()));
    }

    #[test]
    fn below_threshold_never_verifies() {
        let mut hs = holders(3, 2);
        let (mut coordinator, sig) = run_session(&mut hs, &[1], 2, b"payload").unwrap();
        assert!(sig.is_none());
        assert_eq!(coordinator.state(), SessionState::CollectingCommitments);

        // Deadline passes with one commitment: insufficient shares.
        assert!(coordinator.expire(Timestamp::new(u64::MAX)));
        assert_eq!(
            coordinator.state(),
            SessionState::Aborted(AbortReason::InsufficientShares)
        );
    }

    #[test]
    fn tampered_message_fails_group_verification() {
        let mut hs = holders(3, 2);
        let group = hs[0].1.group_public();
        let (_, sig) = run_session(&mut hs, &[1, 2], 2, b"real message").unwrap();
        assert!(!group.verify(b"forged message", &sig.unwrap()));
    }

    #[test]
    fn share_from_outside_signing_set_is_rejected() {
        let mut coordinator = SigningCoordinator::new(
            sid(1),
            b"m".to_vec(),
            1,
            GroupPublic::Solo(aqueduct_types::PublicKey([1; 32])),
            Timestamp::new(u64::MAX),
        )
        .unwrap();
        coordinator.add_commitment(pid(1), &[]).unwrap();
        assert!(matches!(
            coordinator.add_share(pid(2), &[0; 64]),
            Err(FrostError::UnknownParticipant(_))
        ));
    }

    #[test]
    fn expire_mid_shares_is_a_timeout() {
        let mut hs = holders(3, 2);
        let group = hs[0].1.group_public();
        let mut coordinator = SigningCoordinator::new(
            sid(2),
            b"m".to_vec(),
            2,
            group,
            Timestamp::new(1_000),
        )
        .unwrap();

        for (id, holder) in hs.iter_mut().take(2) {
            let c = holder.commit(sid(2), &mut OsRng).unwrap();
            coordinator.add_commitment(*id, &c).unwrap();
        }
        assert_eq!(coordinator.state(), SessionState::CollectingShares);

        assert!(!coordinator.expire(Timestamp::new(999)));
        assert!(coordinator.expire(Timestamp::new(1_000)));
        assert_eq!(
            coordinator.state(),
            SessionState::Aborted(AbortReason::Timeout)
        );
        // Terminal: further rounds are refused.
        assert!(matches!(
            coordinator.add_share(pid(1), &[0; 32]),
            Err(FrostError::SessionClosed)
        ));
    }

    #[test]
    fn solo_session_is_the_same_state_machine() {
        let mut holder = ShareHolder::new(GroupSigner::solo_from_seed(&[9; 32]));
        let group = holder.group_public();
        let mut coordinator = SigningCoordinator::new(
            sid(3),
            b"solo mint".to_vec(),
            1,
            group.clone(),
            Timestamp::new(u64::MAX),
        )
        .unwrap();

        let commitment = holder.commit(sid(3), &mut OsRng).unwrap();
        let package = coordinator
            .add_commitment(pid(1), &commitment)
            .unwrap()
            .expect("solo set seals immediately");
        let share = holder.sign(sid(3), &package, b"solo mint").unwrap();
        let sig = coordinator.add_share(pid(1), &share).unwrap().unwrap();

        assert_eq!(coordinator.state(), SessionState::Verified);
        assert!(group.verify(b"solo mint", &sig));
    }

    #[test]
    fn mismatch_abort_is_terminal() {
        let mut coordinator = SigningCoordinator::new(
            sid(4),
            b"m".to_vec(),
            1,
            GroupPublic::Solo(aqueduct_types::PublicKey([1; 32])),
            Timestamp::new(u64::MAX),
        )
        .unwrap();
        coordinator.abort_mismatch();
        assert_eq!(
            coordinator.state(),
            SessionState::Aborted(AbortReason::MessageMismatch)
        );
        assert!(matches!(
            coordinator.add_commitment(pid(1), &[]),
            Err(FrostError::SessionClosed)
        ));
    }
}
