//! LMDB storage backend for the Aqueduct bridge.
//!
//! Implements the storage traits from `aqueduct-store` using the `heed`
//! LMDB bindings. All tables live in one environment; every mutation is a
//! single write transaction, which is what makes the processed-record
//! marks and index allocations atomic.

pub mod environment;
pub mod error;
mod mappings;
mod meta;
mod processed;

pub use environment::LmdbStore;
pub use error::LmdbError;
