//! Abstract storage traits for the Aqueduct bridge.
//!
//! Every storage backend (LMDB, in-memory for testing) implements these
//! traits. The rest of the codebase depends only on the traits. The
//! processed-record tables are the system's sole at-most-once guarantee:
//! a mint or release happens for a source transaction iff its key gets
//! marked here, and marking is write-once.

pub mod error;
pub mod mappings;
pub mod memory;
pub mod meta;
pub mod processed;

pub use error::StoreError;
pub use mappings::{AddressDeriver, MappingStore};
pub use memory::MemoryStore;
pub use meta::{MetaStore, DEPOSIT_WATERMARK, WITHDRAWAL_WATERMARK};
pub use processed::ProcessedStore;

/// The full storage surface the orchestrator needs, as one object-safe
/// bound.
pub trait BridgeStore: ProcessedStore + MappingStore + MetaStore + Send + Sync {}

impl<T: ProcessedStore + MappingStore + MetaStore + Send + Sync> BridgeStore for T {}
