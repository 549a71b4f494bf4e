//! Bridge-state metadata storage trait.

use aqueduct_types::Height;

use crate::StoreError;

/// Meta key for the deposit observer's watermark.
pub const DEPOSIT_WATERMARK: &str = "deposit_watermark";

/// Meta key for the withdrawal observer's watermark.
pub const WITHDRAWAL_WATERMARK: &str = "withdrawal_watermark";

/// Trait for the bridge-state key/value table: observer watermarks, schema
/// version, and whatever internal bookkeeping doesn't belong in a
/// domain-specific table.
pub trait MetaStore {
    /// Store a metadata value.
    fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Retrieve a metadata value.
    fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Read a persisted observer watermark (convenience wrapper).
    fn watermark(&self, key: &str) -> Result<Option<Height>, StoreError> {
        match self.get_meta(key)? {
            None => Ok(None),
            Some(bytes) => {
                let arr: [u8; 8] = bytes.try_into().map_err(|_| {
                    StoreError::Corruption(format!("watermark '{key}' has unexpected length"))
                })?;
                Ok(Some(Height::from_le_bytes(arr)))
            }
        }
    }

    /// Persist an observer watermark (convenience wrapper).
    fn set_watermark(&self, key: &str, height: Height) -> Result<(), StoreError> {
        self.put_meta(key, &height.to_le_bytes())
    }
}
