use proptest::prelude::*;

use aqueduct_types::{Amount, LedgerAddress, NetworkId, SigningMessage, TxHash};

proptest! {
    /// TxHash roundtrip: new -> as_bytes produces identical bytes.
    #[test]
    fn tx_hash_roundtrip(bytes in prop::array::uniform32(0u8..)) {
        let hash = TxHash::new(bytes);
        prop_assert_eq!(hash.as_bytes(), &bytes);
    }

    /// TxHash hex display parses back to the same hash.
    #[test]
    fn tx_hash_hex_roundtrip(bytes in prop::array::uniform32(0u8..)) {
        let hash = TxHash::new(bytes);
        let parsed: TxHash = hash.to_string().parse().unwrap();
        prop_assert_eq!(hash, parsed);
    }

    /// TxHash::is_zero is true only for all-zero bytes.
    #[test]
    fn tx_hash_is_zero_correct(bytes in prop::array::uniform32(0u8..)) {
        prop_assert_eq!(TxHash::new(bytes).is_zero(), bytes == [0u8; 32]);
    }

    /// checked_add never wraps and agrees with u128 arithmetic.
    #[test]
    fn amount_checked_add(a in any::<u64>(), b in any::<u64>()) {
        let sum = Amount::new(a).checked_add(Amount::new(b));
        match sum {
            Some(s) => prop_assert_eq!(s.atomic() as u128, a as u128 + b as u128),
            None => prop_assert!(a as u128 + b as u128 > u64::MAX as u128),
        }
    }

    /// Two authorizations that differ in any bound field never produce
    /// the same canonical encoding.
    #[test]
    fn canonical_encoding_binds_the_source_tx(
        amount in any::<u64>(),
        tx_a in prop::array::uniform32(0u8..),
        tx_b in prop::array::uniform32(0u8..),
    ) {
        prop_assume!(tx_a != tx_b);
        let recipient = LedgerAddress::new("ldgr1prop");
        let a = SigningMessage::mint(
            Amount::new(amount), &recipient, TxHash::new(tx_a), NetworkId::Dev,
        );
        let b = SigningMessage::mint(
            Amount::new(amount), &recipient, TxHash::new(tx_b), NetworkId::Dev,
        );
        prop_assert_ne!(a.canonical_bytes(), b.canonical_bytes());
    }

    /// The canonical encoding is self-delimiting: the recipient length
    /// prefix means a crafted recipient cannot impersonate another
    /// message's trailing fields.
    #[test]
    fn canonical_encoding_is_unambiguous(
        recipient in "[a-z0-9]{1,40}",
        amount in any::<u64>(),
    ) {
        let msg = SigningMessage::mint(
            Amount::new(amount),
            &LedgerAddress::new(recipient.clone()),
            TxHash::new([7; 32]),
            NetworkId::Dev,
        );
        let bytes = msg.canonical_bytes();
        // Fixed overhead: tag + network + intent + amount + len + tx hash.
        prop_assert_eq!(bytes.len(), 25 + 1 + 1 + 8 + 4 + recipient.len() + 32);
    }
}
