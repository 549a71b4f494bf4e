//! Key material and the participant side of signing.
//!
//! [`OperatorShare`] is what DKG leaves behind: this operator's secret
//! share packaged with the group's public key material. The secret share
//! never leaves the process; only commitments and signature shares do.
//!
//! [`ShareHolder`] enforces the nonce discipline: one commitment per
//! session, nonces consumed on signing and dropped on abort, never
//! reusable across sessions.

use std::collections::HashMap;

use frost_ed25519 as frost;
use rand::{CryptoRng, RngCore};

use aqueduct_types::{PublicKey, SessionId};

use crate::error::FrostError;

/// This operator's long-term share of the group key, produced by DKG.
pub struct OperatorShare {
    key_package: frost::keys::KeyPackage,
    group: frost::keys::PublicKeyPackage,
}

impl OperatorShare {
    pub(crate) fn new(
        key_package: frost::keys::KeyPackage,
        group: frost::keys::PublicKeyPackage,
    ) -> Self {
        Self { key_package, group }
    }

    /// The group verifying key all operators agreed on, as raw Ed25519
    /// bytes.
    pub fn group_key_bytes(&self) -> [u8; 32] {
        let bytes = self
            .group
            .verifying_key()
            .serialize()
            .expect("ed25519 verifying keys always serialize");
        bytes.try_into().expect("ed25519 verifying key is 32 bytes")
    }

    pub fn group_public(&self) -> GroupPublic {
        GroupPublic::Frost(self.group.clone())
    }

    /// Serialize for the operator's keyfile. Contains the secret share;
    /// callers own at-rest protection.
    pub fn to_bytes(&self) -> Result<Vec<u8>, FrostError> {
        let kp = self
            .key_package
            .serialize()
            .map_err(|e| FrostError::Decode(e.to_string()))?;
        let group = self
            .group
            .serialize()
            .map_err(|e| FrostError::Decode(e.to_string()))?;
        let mut out = Vec::with_capacity(4 + kp.len() + group.len());
        out.extend_from_slice(&(kp.len() as u32).to_le_bytes());
        out.extend_from_slice(&kp);
        out.extend_from_slice(&group);
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrostError> {
        if bytes.len() < 4 {
            return Err(FrostError::Decode("share file truncated".into()));
        }
        let kp_len = u32::from_le_bytes(bytes[..4].try_into().unwrap()) as usize;
        let rest = &bytes[4..];
        if rest.len() < kp_len {
            return Err(FrostError::Decode("share file truncated".into()));
        }
        let key_package = frost::keys::KeyPackage::deserialize(&rest[..kp_len])
            .map_err(|e| FrostError::Decode(e.to_string()))?;
        let group = frost::keys::PublicKeyPackage::deserialize(&rest[kp_len..])
            .map_err(|e| FrostError::Decode(e.to_string()))?;
        Ok(Self { key_package, group })
    }
}

/// The group's public key, in a form every operator can verify against.
///
/// Both arms verify plain 64-byte Ed25519 signatures, so downstream code
/// never cares whether the group is a threshold committee or a single
/// operator.
#[derive(Clone)]
pub enum GroupPublic {
    Frost(frost::keys::PublicKeyPackage),
    Solo(PublicKey),
}

impl GroupPublic {
    /// Raw 32-byte Ed25519 verifying key.
    pub fn key_bytes(&self) -> [u8; 32] {
        match self {
            Self::Frost(group) => group
                .verifying_key()
                .serialize()
                .expect("ed25519 verifying keys always serialize")
                .try_into()
                .expect("ed25519 verifying key is 32 bytes"),
            Self::Solo(pk) => pk.0,
        }
    }

    /// Verify an aggregate signature over `message`.
    pub fn verify(&self, message: &[u8], signature: &[u8; 64]) -> bool {
        match self {
            Self::Frost(group) => match frost::Signature::deserialize(signature) {
                Ok(sig) => group.verifying_key().verify(message, &sig).is_ok(),
                Err(_) => false,
            },
            Self::Solo(pk) => aqueduct_crypto::verify_signature(
                message,
                &aqueduct_types::Signature(*signature),
                pk,
            ),
        }
    }
}

/// The signing backend: a DKG share, or a single key for 1-of-1
/// deployments where a threshold ceremony cannot exist.
pub enum GroupSigner {
    Threshold(OperatorShare),
    Solo(SoloSigner),
}

/// Plain Ed25519 signing for a single-operator bridge.
pub struct SoloSigner {
    signing_key: ed25519_dalek::SigningKey,
}

impl GroupSigner {
    /// A 1-of-1 signer from a 32-byte seed.
    pub fn solo_from_seed(seed: &[u8; 32]) -> Self {
        Self::Solo(SoloSigner {
            signing_key: ed25519_dalek::SigningKey::from_bytes(seed),
        })
    }

    pub fn group_public(&self) -> GroupPublic {
        match self {
            Self::Threshold(share) => share.group_public(),
            Self::Solo(solo) => {
                GroupPublic::Solo(PublicKey(solo.signing_key.verifying_key().to_bytes()))
            }
        }
    }
}

enum PendingNonces {
    Frost(frost::round1::SigningNonces),
    Solo,
}

/// Participant-side signing state: the backend plus per-session one-time
/// nonces.
pub struct ShareHolder {
    signer: GroupSigner,
    pending: HashMap<SessionId, PendingNonces>,
}

impl ShareHolder {
    pub fn new(signer: GroupSigner) -> Self {
        Self {
            signer,
            pending: HashMap::new(),
        }
    }

    pub fn group_public(&self) -> GroupPublic {
        self.signer.group_public()
    }

    /// Round 1: generate and commit one-time nonces for a session.
    ///
    /// Committing twice for one session is refused — that is the nonce
    /// reuse the protocol must never allow.
    pub fn commit<R: RngCore + CryptoRng>(
        &mut self,
        session: SessionId,
        rng: &mut R,
    ) -> Result<Vec<u8>, FrostError> {
        if self.pending.contains_key(&session) {
            return Err(FrostError::NonceReuse(session));
        }
        match &self.signer {
            GroupSigner::Threshold(share) => {
                let (nonces, commitments) =
                    frost::round1::commit(share.key_package.signing_share(), rng);
                self.pending.insert(session, PendingNonces::Frost(nonces));
                commitments
                    .serialize()
                    .map_err(|e| FrostError::Decode(e.to_string()))
            }
            GroupSigner::Solo(_) => {
                // No nonce material, but the slot still guards re-entry.
                self.pending.insert(session, PendingNonces::Solo);
                Ok(Vec::new())
            }
        }
    }

    /// Round 2: produce this operator's signature share.
    ///
    /// `expected` is the canonical message for the event this operator
    /// itself observed as confirmed; a package for anything else is
    /// refused. The session's nonces are consumed either way — a failed
    /// round retries with a fresh session, never the same nonces.
    pub fn sign(
        &mut self,
        session: SessionId,
        package: &[u8],
        expected: &[u8],
    ) -> Result<Vec<u8>, FrostError> {
        let nonces = self
            .pending
            .remove(&session)
            .ok_or(FrostError::UnknownSession(session))?;

        match (&self.signer, nonces) {
            (GroupSigner::Threshold(share), PendingNonces::Frost(nonces)) => {
                let signing_package = frost::SigningPackage::deserialize(package)
                    .map_err(|e| FrostError::Decode(e.to_string()))?;
                if signing_package.message()[..] != *expected {
                    return Err(FrostError::MessageMismatch);
                }
                let signature_share =
                    frost::round2::sign(&signing_package, &nonces, &share.key_package)?;
                Ok(signature_share.serialize())
            }
            (GroupSigner::Solo(solo), PendingNonces::Solo) => {
                if package != expected {
                    return Err(FrostError::MessageMismatch);
                }
                use ed25519_dalek::Signer;
                Ok(solo.signing_key.sign(expected).to_bytes().to_vec())
            }
            // A solo signer can only ever hold Solo slots and vice versa.
            _ => Err(FrostError::UnknownSession(session)),
        }
    }

    /// Drop a session's nonces without signing (abort or timeout).
    pub fn release(&mut self, session: SessionId) -> bool {
        self.pending.remove(&session).is_some()
    }

    /// Whether a commitment is outstanding for this session.
    pub fn has_pending(&self, session: SessionId) -> bool {
        self.pending.contains_key(&session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dkg::run_test_ceremony;
    use rand::rngs::OsRng;

    fn sid(b: u8) -> SessionId {
        SessionId::new([b; 32])
    }

    #[test]
    fn commit_twice_is_nonce_reuse() {
        let shares = run_test_ceremony(2, 2);
        let (_, share) = shares.into_iter().next().unwrap();
        let mut holder = ShareHolder::new(GroupSigner::Threshold(share));

        holder.commit(sid(1), &mut OsRng).unwrap();
        assert!(matches!(
            holder.commit(sid(1), &mut OsRng),
            Err(FrostError::NonceReuse(_))
        ));
        // A different session is fine.
        holder.commit(sid(2), &mut OsRng).unwrap();
    }

    #[test]
    fn sign_without_commit_is_unknown_session() {
        let mut holder = ShareHolder::new(GroupSigner::solo_from_seed(&[5; 32]));
        assert!(matches!(
            holder.sign(sid(1), b"msg", b"msg"),
            Err(FrostError::UnknownSession(_))
        ));
    }

    #[test]
    fn release_frees_the_session_slot() {
        let mut holder = ShareHolder::new(GroupSigner::solo_from_seed(&[5; 32]));
        holder.commit(sid(1), &mut OsRng).unwrap();
        assert!(holder.has_pending(sid(1)));
        assert!(holder.release(sid(1)));
        assert!(!holder.has_pending(sid(1)));
        // After release a fresh commit is allowed.
        holder.commit(sid(1), &mut OsRng).unwrap();
    }

    #[test]
    fn solo_sign_verifies_under_group_key() {
        let mut holder = ShareHolder::new(GroupSigner::solo_from_seed(&[7; 32]));
        let group = holder.group_public();

        holder.commit(sid(3), &mut OsRng).unwrap();
        let sig = holder.sign(sid(3), b"release 42", b"release 42").unwrap();
        let sig: [u8; 64] = sig.try_into().unwrap();
        assert!(group.verify(b"release 42", &sig));
        assert!(!group.verify(b"release 43", &sig));
    }

    #[test]
    fn solo_refuses_mismatched_package() {
        let mut holder = ShareHolder::new(GroupSigner::solo_from_seed(&[7; 32]));
        holder.commit(sid(4), &mut OsRng).unwrap();
        assert!(matches!(
            holder.sign(sid(4), b"forged", b"observed"),
            Err(FrostError::MessageMismatch)
        ));
        // Nonce slot is consumed even on refusal.
        assert!(!holder.has_pending(sid(4)));
    }

    #[test]
    fn operator_share_roundtrips_through_bytes() {
        let shares = run_test_ceremony(2, 2);
        let (_, share) = shares.into_iter().next().unwrap();
        let bytes = share.to_bytes().unwrap();
        let restored = OperatorShare::from_bytes(&bytes).unwrap();
        assert_eq!(share.group_key_bytes(), restored.group_key_bytes());
    }
}
