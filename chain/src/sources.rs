//! Event sources binding the polling engine to the two chains.

use aqueduct_types::{DepositEvent, WithdrawalRequest};

use crate::observer::{EventSource, ScanItem};
use crate::rpc::{CoinChainRpc, HostLedgerRpc};
use crate::ChainError;

/// Deposit side: incoming coin-chain transfers to derived addresses.
pub struct DepositSource<R: CoinChainRpc> {
    rpc: R,
}

impl<R: CoinChainRpc> DepositSource<R> {
    pub fn new(rpc: R) -> Self {
        Self { rpc }
    }
}

impl<R: CoinChainRpc> EventSource for DepositSource<R> {
    type Event = DepositEvent;

    fn name(&self) -> &'static str {
        "deposit"
    }

    async fn chain_height(&self) -> Result<aqueduct_types::Height, ChainError> {
        self.rpc.height().await
    }

    async fn is_synchronized(&self) -> Result<bool, ChainError> {
        self.rpc.is_synchronized().await
    }

    async fn scan(
        &self,
        from: aqueduct_types::Height,
        to: aqueduct_types::Height,
    ) -> Result<Vec<ScanItem<DepositEvent>>, ChainError> {
        let transfers = self.rpc.transfers(from, to).await?;
        Ok(transfers
            .into_iter()
            .map(|t| ScanItem {
                tx_hash: t.tx_hash,
                height: t.height,
                event: DepositEvent {
                    tx_hash: t.tx_hash,
                    amount: t.amount,
                    height: t.height,
                    confirmations: 0,
                    deposit_address: t.deposit_address,
                },
            })
            .collect())
    }

    fn finalize(&self, item: &ScanItem<DepositEvent>, confirmations: u64) -> DepositEvent {
        let mut event = item.event.clone();
        event.confirmations = confirmations;
        event
    }
}

/// Withdrawal side: burns of wrapped balance on the host ledger.
pub struct WithdrawalSource<R: HostLedgerRpc> {
    rpc: R,
}

impl<R: HostLedgerRpc> WithdrawalSource<R> {
    pub fn new(rpc: R) -> Self {
        Self { rpc }
    }
}

impl<R: HostLedgerRpc> EventSource for WithdrawalSource<R> {
    type Event = WithdrawalRequest;

    fn name(&self) -> &'static str {
        "withdrawal"
    }

    async fn chain_height(&self) -> Result<aqueduct_types::Height, ChainError> {
        self.rpc.height().await
    }

    async fn is_synchronized(&self) -> Result<bool, ChainError> {
        self.rpc.is_synchronized().await
    }

    async fn scan(
        &self,
        from: aqueduct_types::Height,
        to: aqueduct_types::Height,
    ) -> Result<Vec<ScanItem<WithdrawalRequest>>, ChainError> {
        let burns = self.rpc.burn_events(from, to).await?;
        Ok(burns
            .into_iter()
            .map(|b| ScanItem {
                tx_hash: b.tx_hash,
                height: b.height,
                event: WithdrawalRequest {
                    tx_hash: b.tx_hash,
                    amount: b.amount,
                    destination: b.destination,
                    requester: b.requester,
                },
            })
            .collect())
    }

    fn finalize(&self, item: &ScanItem<WithdrawalRequest>, _confirmations: u64) -> WithdrawalRequest {
        item.event.clone()
    }
}
