use thiserror::Error;

/// The node-level error taxonomy.
///
/// Chain and transport errors recover locally (retry, or the peer misses
/// the round); threshold-protocol errors abort the current session;
/// configuration errors are fatal at startup; ledger errors are fatal at
/// any time — an unavailable durable store halts the orchestrator rather
/// than risk a duplicate mint.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("chain error: {0}")]
    Chain(#[from] aqueduct_chain::ChainError),

    #[error("transport error: {0}")]
    Transport(#[from] aqueduct_network::NetworkError),

    #[error("threshold protocol error: {0}")]
    Protocol(#[from] aqueduct_frost::FrostError),

    #[error("ledger store error: {0}")]
    Ledger(#[from] aqueduct_store::StoreError),

    #[error("DKG failed permanently: {0}")]
    DkgFatal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}
