use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("chain query failed: {0}")]
    Query(String),

    #[error("chain action failed: {0}")]
    Action(String),

    #[error("event channel closed")]
    ChannelClosed,

    #[error("store error: {0}")]
    Store(#[from] aqueduct_store::StoreError),
}
