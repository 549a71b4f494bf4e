//! Deposit-address derivation seam.
//!
//! Real deployments derive subaddresses from the bridge wallet's view key
//! inside the wallet collaborator; this digest-based deriver stands in
//! for dev networks and tests, with the same contract: deterministic,
//! collision-free per `(account, index)`, opaque to the rest of the
//! system.

use aqueduct_crypto::blake2b_256_multi;
use aqueduct_store::AddressDeriver;
use aqueduct_types::{CoinAddress, NetworkId};

/// Deterministic address derivation from a digest of the coordinates.
pub struct DigestDeriver {
    network: NetworkId,
}

impl DigestDeriver {
    pub fn new(network: NetworkId) -> Self {
        Self { network }
    }
}

impl AddressDeriver for DigestDeriver {
    fn derive(&self, account: u32, index: u32) -> CoinAddress {
        let digest = blake2b_256_multi(&[
            b"aqueduct/subaddress",
            &[self.network.tag()],
            &account.to_be_bytes(),
            &index.to_be_bytes(),
        ]);
        let hex: String = digest[..20].iter().map(|b| format!("{b:02x}")).collect();
        CoinAddress::new(format!("aq{}{hex}", self.network.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_and_distinct() {
        let deriver = DigestDeriver::new(NetworkId::Dev);
        let a = deriver.derive(0, 1);
        assert_eq!(a, deriver.derive(0, 1));
        assert_ne!(a, deriver.derive(0, 2));
        assert_ne!(a, deriver.derive(1, 1));
    }

    #[test]
    fn networks_do_not_collide() {
        let dev = DigestDeriver::new(NetworkId::Dev).derive(0, 1);
        let main = DigestDeriver::new(NetworkId::Main).derive(0, 1);
        assert_ne!(dev, main);
    }
}
