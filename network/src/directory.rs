//! The static operator roster.

use std::collections::BTreeMap;

use aqueduct_types::{ParticipantId, PublicKey};

use crate::NetworkError;

/// One operator's entry in the out-of-band-configured roster.
#[derive(Clone, Debug)]
pub struct OperatorEntry {
    pub id: ParticipantId,
    /// "host:port" the operator listens on.
    pub endpoint: String,
    /// Ed25519 key its envelopes are signed with.
    pub identity_key: PublicKey,
}

/// The full roster plus which entry is this process.
///
/// Membership is fixed for the lifetime of a group key; changing it means
/// a new DKG, so the directory is immutable after construction.
pub struct OperatorDirectory {
    entries: BTreeMap<ParticipantId, OperatorEntry>,
    local: ParticipantId,
}

impl OperatorDirectory {
    pub fn new(
        local: ParticipantId,
        roster: Vec<OperatorEntry>,
    ) -> Result<Self, NetworkError> {
        let mut entries = BTreeMap::new();
        for entry in roster {
            if entries.insert(entry.id, entry).is_some() {
                return Err(NetworkError::Decode(
                    "duplicate participant id in roster".into(),
                ));
            }
        }
        if !entries.contains_key(&local) {
            return Err(NetworkError::PeerNotFound(local));
        }
        Ok(Self { entries, local })
    }

    pub fn local(&self) -> ParticipantId {
        self.local
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: ParticipantId) -> Option<&OperatorEntry> {
        self.entries.get(&id)
    }

    /// The identity key an envelope from `id` must verify under.
    pub fn identity_key(&self, id: ParticipantId) -> Option<&PublicKey> {
        self.entries.get(&id).map(|e| &e.identity_key)
    }

    /// Every operator in roster order.
    pub fn all(&self) -> impl Iterator<Item = &OperatorEntry> {
        self.entries.values()
    }

    /// Every operator except this process.
    pub fn peers(&self) -> impl Iterator<Item = &OperatorEntry> {
        let local = self.local;
        self.entries.values().filter(move |e| e.id != local)
    }

    pub fn participant_ids(&self) -> Vec<ParticipantId> {
        self.entries.keys().copied().collect()
    }

    /// The signing coordinator: the lowest participant id in the roster.
    pub fn coordinator(&self) -> ParticipantId {
        *self
            .entries
            .keys()
            .next()
            .expect("directory is never empty")
    }

    pub fn is_coordinator(&self) -> bool {
        self.coordinator() == self.local
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(i: u16) -> OperatorEntry {
        OperatorEntry {
            id: ParticipantId::new(i).unwrap(),
            endpoint: format!("127.0.0.1:{}", 9000 + i),
            identity_key: PublicKey([i as u8; 32]),
        }
    }

    #[test]
    fn lowest_id_coordinates() {
        let dir = OperatorDirectory::new(
            ParticipantId::new(3).unwrap(),
            vec![entry(3), entry(1), entry(2)],
        )
        .unwrap();
        assert_eq!(dir.coordinator(), ParticipantId::new(1).unwrap());
        assert!(!dir.is_coordinator());
        assert_eq!(dir.peers().count(), 2);
    }

    #[test]
    fn local_must_be_in_roster() {
        let err = OperatorDirectory::new(ParticipantId::new(9).unwrap(), vec![entry(1)]);
        assert!(matches!(err, Err(NetworkError::PeerNotFound(_))));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err =
            OperatorDirectory::new(ParticipantId::new(1).unwrap(), vec![entry(1), entry(1)]);
        assert!(matches!(err, Err(NetworkError::Decode(_))));
    }
}
