//! In-process chain stubs for dev-network runs.
//!
//! Real deployments inject their coin-chain and host-ledger RPC clients;
//! on `--network dev` the daemon wires these stand-ins instead so the
//! whole pipeline (transport, DKG, observers, signing) can be exercised
//! on one machine. Heights tick with wall time; no transfers ever appear
//! unless something injects them.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use aqueduct_chain::{BurnRecord, ChainError, CoinChainRpc, HostLedgerRpc, IncomingTransfer};
use aqueduct_crypto::blake2b_256;
use aqueduct_types::{Height, SigningMessage, TxHash};

struct Inner {
    started: Instant,
    base_height: Height,
    secs_per_block: u64,
}

/// One simulated chain, usable as either side.
#[derive(Clone)]
pub struct DevChain {
    inner: Arc<Mutex<Inner>>,
}

impl DevChain {
    pub fn new(base_height: Height, secs_per_block: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                started: Instant::now(),
                base_height,
                secs_per_block: secs_per_block.max(1),
            })),
        }
    }

    fn current_height(&self) -> Height {
        let inner = self.inner.lock().expect("devchain lock");
        inner.base_height + inner.started.elapsed().as_secs() / inner.secs_per_block
    }

    fn synthetic_tx(message: &SigningMessage) -> TxHash {
        TxHash::new(blake2b_256(&message.canonical_bytes()))
    }
}

impl CoinChainRpc for DevChain {
    async fn height(&self) -> Result<Height, ChainError> {
        Ok(self.current_height())
    }

    async fn is_synchronized(&self) -> Result<bool, ChainError> {
        Ok(true)
    }

    async fn transfers(
        &self,
        _from: Height,
        _to: Height,
    ) -> Result<Vec<IncomingTransfer>, ChainError> {
        Ok(Vec::new())
    }

    async fn broadcast_release(
        &self,
        authorization: &SigningMessage,
        _signature: &[u8; 64],
    ) -> Result<TxHash, ChainError> {
        Ok(Self::synthetic_tx(authorization))
    }
}

impl HostLedgerRpc for DevChain {
    async fn height(&self) -> Result<Height, ChainError> {
        Ok(self.current_height())
    }

    async fn is_synchronized(&self) -> Result<bool, ChainError> {
        Ok(true)
    }

    async fn burn_events(&self, _from: Height, _to: Height) -> Result<Vec<BurnRecord>, ChainError> {
        Ok(Vec::new())
    }

    async fn mint(
        &self,
        authorization: &SigningMessage,
        _signature: &[u8; 64],
    ) -> Result<TxHash, ChainError> {
        Ok(Self::synthetic_tx(authorization))
    }
}
