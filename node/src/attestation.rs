//! Registry of locally observed, confirmed events.
//!
//! The binding check: before contributing a signature share, an operator
//! verifies the requested authorization matches an event *its own*
//! observers confirmed. A coordinator that invents a mint request finds
//! no honest participant willing to sign it.

use std::collections::HashSet;
use std::sync::Mutex;

use aqueduct_crypto::blake2b_256;
use aqueduct_types::SigningMessage;

/// Canonical-message digests of everything this operator observed as
/// confirmed.
#[derive(Default)]
pub struct ObservedRegistry {
    digests: Mutex<HashSet<[u8; 32]>>,
}

impl ObservedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an authorization this operator's observers vouch for.
    pub fn record(&self, message: &SigningMessage) {
        let digest = blake2b_256(&message.canonical_bytes());
        self.digests.lock().expect("registry lock").insert(digest);
    }

    /// Whether an incoming signing request matches a local observation.
    pub fn is_bound(&self, message: &SigningMessage) -> bool {
        let digest = blake2b_256(&message.canonical_bytes());
        self.digests.lock().expect("registry lock").contains(&digest)
    }

    pub fn len(&self) -> usize {
        self.digests.lock().expect("registry lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
