//! LMDB environment setup.

use std::path::Path;
use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use crate::LmdbError;

/// Number of named databases the bridge uses.
const MAX_DBS: u32 = 8;

/// Default map size: 1 GiB, far beyond what bridge bookkeeping needs.
pub const DEFAULT_MAP_SIZE: usize = 1024 * 1024 * 1024;

/// Wraps the LMDB environment and all database handles.
///
/// One instance per operator process; cheap to share behind an `Arc`.
pub struct LmdbStore {
    env: Arc<Env>,
    pub(crate) processed_deposits: Database<Bytes, Bytes>,
    pub(crate) processed_withdrawals: Database<Bytes, Bytes>,
    pub(crate) mappings_by_key: Database<Bytes, Bytes>,
    pub(crate) mappings_by_address: Database<Bytes, Bytes>,
    pub(crate) mappings_by_owner: Database<Bytes, Bytes>,
    pub(crate) meta: Database<Bytes, Bytes>,
}

impl LmdbStore {
    /// Open or create an LMDB environment at the given path.
    pub fn open(path: &Path, map_size: usize) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(path).map_err(|e| {
            LmdbError::Serialization(format!("cannot create data dir {}: {e}", path.display()))
        })?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(MAX_DBS)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let processed_deposits = env.create_database(&mut wtxn, Some("processed_deposits"))?;
        let processed_withdrawals =
            env.create_database(&mut wtxn, Some("processed_withdrawals"))?;
        let mappings_by_key = env.create_database(&mut wtxn, Some("mappings_by_key"))?;
        let mappings_by_address = env.create_database(&mut wtxn, Some("mappings_by_address"))?;
        let mappings_by_owner = env.create_database(&mut wtxn, Some("mappings_by_owner"))?;
        let meta = env.create_database(&mut wtxn, Some("meta"))?;
        wtxn.commit()?;

        tracing::info!(path = %path.display(), "opened LMDB store");

        Ok(Self {
            env: Arc::new(env),
            processed_deposits,
            processed_withdrawals,
            mappings_by_key,
            mappings_by_address,
            mappings_by_owner,
            meta,
        })
    }

    pub(crate) fn env(&self) -> &Env {
        &self.env
    }
}
