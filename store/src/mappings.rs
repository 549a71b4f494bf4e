//! Deposit-address mapping storage trait.

use aqueduct_types::{AddressMapping, CoinAddress, LedgerAddress};

use crate::StoreError;

/// Derives the deposit address for a `(account, index)` pair.
///
/// Subaddress derivation is deterministic from the bridge wallet's view
/// key, so the wallet collaborator exposes it as a pure function. Keeping
/// it a trait lets the store allocate the index and derive the address
/// under one write transaction.
pub trait AddressDeriver: Send + Sync {
    fn derive(&self, account: u32, index: u32) -> CoinAddress;
}

/// Trait for the bidirectional identity map.
///
/// Each ledger identity owns at most one derived deposit address. Indices
/// within an account strictly increase and are never reused, even across
/// restarts; `(account, index)`, the derived address, and the owner are
/// each unique keys.
pub trait MappingStore {
    /// Map a ledger identity to its deposit address, allocating the next
    /// index and deriving the address on first call. Idempotent: repeat
    /// calls return the existing mapping unchanged.
    fn map_identity(
        &self,
        owner: &LedgerAddress,
        account: u32,
        deriver: &dyn AddressDeriver,
    ) -> Result<AddressMapping, StoreError>;

    /// Look up the mapping that owns a derived deposit address.
    fn resolve_deposit_address(
        &self,
        address: &CoinAddress,
    ) -> Result<Option<AddressMapping>, StoreError>;

    /// Look up a ledger identity's mapping, if one was ever allocated.
    fn mapping_for_owner(
        &self,
        owner: &LedgerAddress,
    ) -> Result<Option<AddressMapping>, StoreError>;

    /// The index the next allocation in `account` would receive.
    fn next_index(&self, account: u32) -> Result<u32, StoreError>;
}
