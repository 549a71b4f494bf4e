//! Distributed key generation ceremony.
//!
//! Runs once per deployment (and again on any membership change). Round 1
//! broadcasts a commitment to each participant's secret polynomial plus a
//! proof of knowledge of its constant term; round 2 privately delivers each
//! polynomial evaluated at the recipient's index; finalization folds the
//! received evaluations into the long-term secret share and every
//! commitment into the group public key. All participants must end up with
//! the identical group key or finalization fails.
//!
//! The ceremony itself is deadline-free; the node driving it applies the
//! round timeouts, excludes silent or invalid peers via [`DkgCeremony::missing`],
//! and restarts with the survivors while at least `threshold` remain.

use std::collections::BTreeMap;

use frost_ed25519::keys::dkg as frost_dkg;
use frost_ed25519::Identifier;
use rand::{CryptoRng, RngCore};

use aqueduct_types::ParticipantId;

use crate::signer::OperatorShare;
use crate::FrostError;

/// Map a roster index onto its Shamir evaluation point.
pub(crate) fn identifier(id: ParticipantId) -> Result<Identifier, FrostError> {
    Identifier::try_from(id.index()).map_err(FrostError::Protocol)
}

/// What `receive_round1` hands back once the round completes: one private
/// package per peer, to be sent point-to-point.
pub type Round2Packages = BTreeMap<ParticipantId, Vec<u8>>;

/// Result of finalization.
pub struct DkgOutcome {
    pub share: OperatorShare,
}

enum CeremonyRound {
    One {
        secret: frost_dkg::round1::SecretPackage,
        received: BTreeMap<ParticipantId, frost_dkg::round1::Package>,
    },
    Two {
        secret: frost_dkg::round2::SecretPackage,
        round1: BTreeMap<ParticipantId, frost_dkg::round1::Package>,
        received: BTreeMap<ParticipantId, frost_dkg::round2::Package>,
    },
    Done,
}

/// One participant's view of a DKG ceremony.
pub struct DkgCeremony {
    id: ParticipantId,
    threshold: u16,
    peers: Vec<ParticipantId>,
    round: CeremonyRound,
}

impl DkgCeremony {
    /// Start a ceremony. Returns the ceremony and this participant's
    /// round-1 package, serialized for broadcast.
    pub fn new<R: RngCore + CryptoRng>(
        id: ParticipantId,
        roster: &[ParticipantId],
        threshold: u16,
        rng: &mut R,
    ) -> Result<(Self, Vec<u8>), FrostError> {
        let total = roster.len() as u16;
        if threshold < 2 || threshold > total {
            return Err(FrostError::InvalidThreshold { threshold, total });
        }
        if !roster.contains(&id) {
            return Err(FrostError::UnknownParticipant(id));
        }

        let (secret, package) = frost_dkg::part1(identifier(id)?, total, threshold, rng)?;
        let broadcast = package
            .serialize()
            .map_err(|e| FrostError::Decode(e.to_string()))?;

        let peers = roster.iter().copied().filter(|p| *p != id).collect();
        Ok((
            Self {
                id,
                threshold,
                peers,
                round: CeremonyRound::One {
                    secret,
                    received: BTreeMap::new(),
                },
            },
            broadcast,
        ))
    }

    pub fn participant(&self) -> ParticipantId {
        self.id
    }

    /// Peers whose package for the current round has not arrived yet.
    /// The driver excludes these when the round deadline passes.
    pub fn missing(&self) -> Vec<ParticipantId> {
        let received: Vec<ParticipantId> = match &self.round {
            CeremonyRound::One { received, .. } => received.keys().copied().collect(),
            CeremonyRound::Two { received, .. } => received.keys().copied().collect(),
            CeremonyRound::Done => return Vec::new(),
        };
        self.peers
            .iter()
            .copied()
            .filter(|p| !received.contains(p))
            .collect()
    }

    /// Ingest a peer's broadcast round-1 package.
    ///
    /// Once every peer has delivered one, the ceremony advances to round 2
    /// and returns this participant's private round-2 packages, keyed by
    /// recipient.
    pub fn receive_round1(
        &mut self,
        from: ParticipantId,
        package: &[u8],
    ) -> Result<Option<Round2Packages>, FrostError> {
        if !self.peers.contains(&from) {
            return Err(FrostError::UnknownParticipant(from));
        }
        let CeremonyRound::One { received, .. } = &mut self.round else {
            return Err(FrostError::WrongRound);
        };
        if received.contains_key(&from) {
            return Err(FrostError::DuplicatePackage(from));
        }

        let package = frost_dkg::round1::Package::deserialize(package)
            .map_err(|e| FrostError::Decode(e.to_string()))?;
        received.insert(from, package);

        if received.len() < self.peers.len() {
            return Ok(None);
        }

        // Round complete: evaluate our polynomial at every peer's index.
        let CeremonyRound::One { secret, received } =
            std::mem::replace(&mut self.round, CeremonyRound::Done)
        else {
            unreachable!("round checked above");
        };

        let mut by_identifier = BTreeMap::new();
        for (pid, pkg) in &received {
            by_identifier.insert(identifier(*pid)?, pkg.clone());
        }
        let (round2_secret, outgoing) = frost_dkg::part2(secret, &by_identifier)?;

        let mut packages = BTreeMap::new();
        for (ident, pkg) in outgoing {
            let pid = self
                .peers
                .iter()
                .copied()
                .find(|p| identifier(*p).map(|i| i == ident).unwrap_or(false))
                .ok_or(FrostError::WrongRound)?;
            packages.insert(
                pid,
                pkg.serialize().map_err(|e| FrostError::Decode(e.to_string()))?,
            );
        }

        self.round = CeremonyRound::Two {
            secret: round2_secret,
            round1: received,
            received: BTreeMap::new(),
        };
        tracing::debug!(participant = %self.id, "DKG round 1 complete");
        Ok(Some(packages))
    }

    /// Ingest the private round-2 package a peer addressed to us.
    ///
    /// Once every peer has delivered one, finalization runs: the secret
    /// share is assembled, the group key derived, and the ceremony ends.
    pub fn receive_round2(
        &mut self,
        from: ParticipantId,
        package: &[u8],
    ) -> Result<Option<DkgOutcome>, FrostError> {
        if !self.peers.contains(&from) {
            return Err(FrostError::UnknownParticipant(from));
        }
        let CeremonyRound::Two { received, .. } = &mut self.round else {
            return Err(FrostError::WrongRound);
        };
        if received.contains_key(&from) {
            return Err(FrostError::DuplicatePackage(from));
        }

        let package = frost_dkg::round2::Package::deserialize(package)
            .map_err(|e| FrostError::Decode(e.to_string()))?;
        received.insert(from, package);

        if received.len() < self.peers.len() {
            return Ok(None);
        }

        let CeremonyRound::Two {
            secret,
            round1,
            received,
        } = std::mem::replace(&mut self.round, CeremonyRound::Done)
        else {
            unreachable!("round checked above");
        };

        let mut round1_by_ident = BTreeMap::new();
        for (pid, pkg) in &round1 {
            round1_by_ident.insert(identifier(*pid)?, pkg.clone());
        }
        let mut round2_by_ident = BTreeMap::new();
        for (pid, pkg) in &received {
            round2_by_ident.insert(identifier(*pid)?, pkg.clone());
        }

        let (key_package, public_key_package) =
            frost_dkg::part3(&secret, &round1_by_ident, &round2_by_ident)?;

        tracing::info!(participant = %self.id, "DKG complete");
        Ok(Some(DkgOutcome {
            share: OperatorShare::new(key_package, public_key_package),
        }))
    }

    /// Whether a restart with `surviving` members can still reach the
    /// threshold. A `false` here is fatal for the deployment.
    pub fn can_restart_with(&self, surviving: u16) -> bool {
        surviving >= self.threshold
    }
}

/// Drive a full ceremony among `n` in-memory participants, delivering
/// every package instantly. Shared by the signing-session tests.
#[cfg(test)]
pub(crate) fn run_test_ceremony(n: u16, threshold: u16) -> Vec<(ParticipantId, OperatorShare)> {
    use rand::rngs::OsRng;

    let roster: Vec<ParticipantId> = (1..=n).map(|i| ParticipantId::new(i).unwrap()).collect();
    let mut ceremonies = Vec::new();
    let mut round1 = Vec::new();
    for id in &roster {
        let (c, pkg) = DkgCeremony::new(*id, &roster, threshold, &mut OsRng).unwrap();
        ceremonies.push(c);
        round1.push((*id, pkg));
    }

    // Broadcast round 1; collect everyone's private round-2 packages.
    let mut round2: Vec<(ParticipantId, Round2Packages)> = Vec::new();
    for c in ceremonies.iter_mut() {
        let mut out = None;
        for (from, pkg) in &round1 {
            if *from == c.participant() {
                continue;
            }
            out = c.receive_round1(*from, pkg).unwrap();
        }
        round2.push((c.participant(), out.expect("round 1 complete")));
    }

    // Deliver round-2 packages point-to-point; finalize.
    let mut outcomes = Vec::new();
    for c in ceremonies.iter_mut() {
        let mut outcome = None;
        for (from, packages) in &round2 {
            if *from == c.participant() {
                continue;
            }
            let pkg = &packages[&c.participant()];
            outcome = c.receive_round2(*from, pkg).unwrap();
        }
        outcomes.push((c.participant(), outcome.expect("finalized").share));
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn pid(i: u16) -> ParticipantId {
        ParticipantId::new(i).unwrap()
    }

    #[test]
    fn three_party_ceremony_agrees_on_group_key() {
        let outcomes = run_test_ceremony(3, 2);
        let key = outcomes[0].1.group_key_bytes();
        assert!(outcomes.iter().all(|(_, s)| s.group_key_bytes() == key));
    }

    #[test]
    fn rejects_invalid_threshold() {
        let roster = vec![pid(1), pid(2)];
        assert!(matches!(
            DkgCeremony::new(pid(1), &roster, 3, &mut OsRng),
            Err(FrostError::InvalidThreshold { .. })
        ));
        assert!(matches!(
            DkgCeremony::new(pid(1), &roster, 1, &mut OsRng),
            Err(FrostError::InvalidThreshold { .. })
        ));
    }

    #[test]
    fn rejects_package_from_stranger() {
        let roster = vec![pid(1), pid(2), pid(3)];
        let (mut c, _) = DkgCeremony::new(pid(1), &roster, 2, &mut OsRng).unwrap();
        let err = c.receive_round1(pid(9), b"junk").unwrap_err();
        assert!(matches!(err, FrostError::UnknownParticipant(_)));
    }

    #[test]
    fn rejects_duplicate_round1_package() {
        let roster = vec![pid(1), pid(2), pid(3)];
        let (mut c1, _) = DkgCeremony::new(pid(1), &roster, 2, &mut OsRng).unwrap();
        let (_, pkg2) = DkgCeremony::new(pid(2), &roster, 2, &mut OsRng).unwrap();

        assert!(c1.receive_round1(pid(2), &pkg2).unwrap().is_none());
        assert!(matches!(
            c1.receive_round1(pid(2), &pkg2),
            Err(FrostError::DuplicatePackage(_))
        ));
    }

    #[test]
    fn missing_reports_silent_peers() {
        let roster = vec![pid(1), pid(2), pid(3)];
        let (mut c1, _) = DkgCeremony::new(pid(1), &roster, 2, &mut OsRng).unwrap();
        let (_, pkg2) = DkgCeremony::new(pid(2), &roster, 2, &mut OsRng).unwrap();

        assert_eq!(c1.missing(), vec![pid(2), pid(3)]);
        c1.receive_round1(pid(2), &pkg2).unwrap();
        assert_eq!(c1.missing(), vec![pid(3)]);
    }

    #[test]
    fn restart_floor_is_the_threshold() {
        let roster = vec![pid(1), pid(2), pid(3)];
        let (c, _) = DkgCeremony::new(pid(1), &roster, 2, &mut OsRng).unwrap();
        assert!(c.can_restart_with(2));
        assert!(!c.can_restart_with(1));
    }

    #[test]
    fn garbled_package_is_a_decode_error() {
        let roster = vec![pid(1), pid(2)];
        let (mut c, _) = DkgCeremony::new(pid(1), &roster, 2, &mut OsRng).unwrap();
        assert!(matches!(
            c.receive_round1(pid(2), &[0u8; 7]),
            Err(FrostError::Decode(_))
        ));
    }
}
