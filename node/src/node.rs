//! The bridge orchestrator.
//!
//! One [`BridgeNode`] per operator process. It owns the two chain
//! observers, the transport's inbound stream, the signing state for both
//! roles (coordinator and participant), and the pre-filter/mark
//! bookkeeping around every chain action.
//!
//! Sequencing per asset movement: observe → attest → sign → act → mark.
//! The `is_processed` pre-filter runs before signing and the mark happens
//! only after the chain action succeeded; the two are not one
//! transaction, so a redundant concurrent session is possible and safe —
//! the signed message binds the source tx hash and the target chain
//! rejects a replayed proof.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::OsRng;
use rand::RngCore;
use tokio::sync::{broadcast, mpsc};

use aqueduct_chain::{
    ChainObserver, CoinChainRpc, DepositSource, HostLedgerRpc, ObserverConfig, Side,
    WithdrawalSource,
};
use aqueduct_frost::{ShareHolder, SigningCoordinator};
use aqueduct_network::{BridgeMessage, Inbound, OperatorDirectory, Transport};
use aqueduct_store::{AddressDeriver, BridgeStore};
use aqueduct_types::{
    Amount, BridgeStatus, DepositEvent, Intent, ParticipantId, ProcessedRecord, SessionId,
    SigningMessage, Timestamp, TxHash, WithdrawalRequest,
};
use aqueduct_utils::now_secs;

use crate::attestation::ObservedRegistry;
use crate::config::BridgeConfig;
use crate::BridgeError;

/// An authorization the coordinator owes the chains, across session
/// retries. Keyed by the canonical digest of its message.
struct InFlight {
    message: SigningMessage,
    session: Option<SessionId>,
    retry_at: Timestamp,
}

/// Participant-side view of one open session.
struct ParticipantSession {
    coordinator: ParticipantId,
    expected: Vec<u8>,
    deadline: Timestamp,
}

/// The operator node.
pub struct BridgeNode<C, L, T> {
    config: BridgeConfig,
    directory: Arc<OperatorDirectory>,
    store: Arc<dyn BridgeStore>,
    deriver: Arc<dyn AddressDeriver>,
    coin: C,
    ledger: L,
    transport: T,
    inbound: Inbound,
    holder: ShareHolder,
    registry: ObservedRegistry,
    status: BridgeStatus,

    // Coordinator role.
    sessions: HashMap<SessionId, SigningCoordinator>,
    session_refusals: HashMap<SessionId, u16>,
    in_flight: HashMap<[u8; 32], InFlight>,

    // Participant role.
    participant_sessions: HashMap<SessionId, ParticipantSession>,
}

impl<C, L, T> BridgeNode<C, L, T>
where
    C: CoinChainRpc + Clone,
    L: HostLedgerRpc + Clone,
    T: Transport,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: BridgeConfig,
        directory: Arc<OperatorDirectory>,
        store: Arc<dyn BridgeStore>,
        deriver: Arc<dyn AddressDeriver>,
        coin: C,
        ledger: L,
        transport: T,
        inbound: Inbound,
        holder: ShareHolder,
    ) -> Self {
        Self {
            config,
            directory,
            store,
            deriver,
            coin,
            ledger,
            transport,
            inbound,
            holder,
            registry: ObservedRegistry::new(),
            status: BridgeStatus::Initializing,
            sessions: HashMap::new(),
            session_refusals: HashMap::new(),
            in_flight: HashMap::new(),
            participant_sessions: HashMap::new(),
        }
    }

    pub fn status(&self) -> BridgeStatus {
        self.status
    }

    /// The deposit-address map, exposed for the front door: idempotent
    /// allocation plus both lookups live on the store handle itself.
    pub fn store(&self) -> &Arc<dyn BridgeStore> {
        &self.store
    }

    /// Run the node until shutdown.
    pub async fn run(mut self, shutdown: broadcast::Sender<()>) -> Result<(), BridgeError> {
        let poll = Duration::from_secs(self.config.poll_interval_secs);
        let (deposit_tx, mut deposit_rx) = mpsc::channel::<DepositEvent>(64);
        let (withdrawal_tx, mut withdrawal_rx) = mpsc::channel::<WithdrawalRequest>(64);

        let deposit_observer = ChainObserver::new(
            DepositSource::new(self.coin.clone()),
            Arc::clone(&self.store),
            ObserverConfig::new(Side::Deposit, self.config.min_confirmations, poll),
        );
        tokio::spawn(deposit_observer.run(deposit_tx, shutdown.subscribe()));

        let withdrawal_observer = ChainObserver::new(
            WithdrawalSource::new(self.ledger.clone()),
            Arc::clone(&self.store),
            ObserverConfig::new(Side::Withdrawal, self.config.min_confirmations, poll),
        );
        tokio::spawn(withdrawal_observer.run(withdrawal_tx, shutdown.subscribe()));

        self.status = BridgeStatus::Running;
        tracing::info!(
            participant = %self.directory.local(),
            coordinator = self.directory.is_coordinator(),
            "bridge node running"
        );

        let mut shutdown_rx = shutdown.subscribe();
        let mut tick = tokio::time::interval(Duration::from_secs(1));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let result = loop {
            let step = tokio::select! {
                _ = shutdown_rx.recv() => break Ok(()),
                event = deposit_rx.recv() => match event {
                    Some(event) => self.handle_deposit(event).await,
                    None => break Ok(()),
                },
                request = withdrawal_rx.recv() => match request {
                    Some(request) => self.handle_withdrawal(request).await,
                    None => break Ok(()),
                },
                message = self.inbound.recv() => match message {
                    Some((from, message)) => self.dispatch(from, message).await,
                    None => break Ok(()),
                },
                _ = tick.tick() => self.on_tick().await,
            };

            match step {
                Ok(()) => {}
                // Durable-store failure: halt rather than risk a double
                // mint on ambiguous state.
                Err(BridgeError::Ledger(e)) => {
                    tracing::error!(error = %e, "ledger store failed, halting");
                    break Err(BridgeError::Ledger(e));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "step failed, event left for next cycle");
                }
            }
        };

        self.status = match result {
            Ok(()) => BridgeStatus::Paused,
            Err(_) => BridgeStatus::Error,
        };
        tracing::info!(status = self.status.as_str(), "bridge node stopped");
        result
    }

    // ── Observation ────────────────────────────────────────────────────

    async fn handle_deposit(&mut self, event: DepositEvent) -> Result<(), BridgeError> {
        let Some(mapping) = self.store.resolve_deposit_address(&event.deposit_address)? else {
            tracing::error!(tx = %event.tx_hash, address = %event.deposit_address,
                "deposit to unmapped address, leaving unprocessed");
            return Ok(());
        };

        let message = SigningMessage::mint(
            event.amount,
            &mapping.owner,
            event.tx_hash,
            self.config.network,
        );
        self.registry.record(&message);
        tracing::info!(tx = %event.tx_hash, amount = %event.amount, owner = %mapping.owner,
            confirmations = event.confirmations, "deposit confirmed");

        // Attestation is best-effort; a transport hiccup must not lose
        // the event.
        if let Err(e) = self
            .transport
            .broadcast(BridgeMessage::DepositAttestation { event: event.clone() })
            .await
        {
            tracing::warn!(error = %e, "deposit attestation broadcast failed");
        }

        if self.store.is_deposit_processed(&event.tx_hash)? {
            return Ok(());
        }
        if self.directory.is_coordinator() {
            self.queue_authorization(message).await?;
        }
        Ok(())
    }

    async fn handle_withdrawal(&mut self, request: WithdrawalRequest) -> Result<(), BridgeError> {
        let message = SigningMessage::release(
            request.amount,
            &request.destination,
            request.tx_hash,
            self.config.network,
        );
        self.registry.record(&message);
        tracing::info!(tx = %request.tx_hash, amount = %request.amount,
            destination = %request.destination, "burn confirmed");

        if let Err(e) = self
            .transport
            .broadcast(BridgeMessage::WithdrawalAttestation {
                request: request.clone(),
            })
            .await
        {
            tracing::warn!(error = %e, "burn attestation broadcast failed");
        }

        if self.store.is_withdrawal_processed(&request.tx_hash)? {
            return Ok(());
        }
        if self.directory.is_coordinator() {
            self.queue_authorization(message).await?;
        }
        Ok(())
    }

    // ── Coordinator role ───────────────────────────────────────────────

    async fn queue_authorization(&mut self, message: SigningMessage) -> Result<(), BridgeError> {
        let digest = aqueduct_crypto::blake2b_256(&message.canonical_bytes());
        if self.in_flight.contains_key(&digest) {
            return Ok(());
        }
        self.in_flight.insert(
            digest,
            InFlight {
                message: message.clone(),
                session: None,
                retry_at: Timestamp::new(0),
            },
        );
        self.open_session(digest).await
    }

    async fn open_session(&mut self, digest: [u8; 32]) -> Result<(), BridgeError> {
        let Some(flight) = self.in_flight.get(&digest) else {
            return Ok(());
        };
        let message = flight.message.clone();

        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        let session = SessionId::new(bytes);
        let deadline = Timestamp::new(now_secs() + self.config.session_timeout_secs);

        let mut coordinator = SigningCoordinator::new(
            session,
            message.canonical_bytes(),
            self.config.threshold,
            self.holder.group_public(),
            deadline,
        )?;

        tracing::info!(%session, intent = %message.intent, tx = %message.source_tx,
            "opening signing session");
        self.transport
            .broadcast(BridgeMessage::SigningRequest {
                session,
                message: message.clone(),
                deadline_secs: self.config.session_timeout_secs,
            })
            .await?;

        // The coordinator is also a signer; its commitment opens the set.
        let commitment = self.holder.commit(session, &mut OsRng)?;
        let sealed = coordinator.add_commitment(self.directory.local(), &commitment)?;

        if let Some(flight) = self.in_flight.get_mut(&digest) {
            flight.session = Some(session);
        }
        self.sessions.insert(session, coordinator);

        if let Some(package) = sealed {
            self.distribute_package(session, package).await?;
        }
        Ok(())
    }

    /// Broadcast the sealed signing package and contribute the
    /// coordinator's own share.
    async fn distribute_package(
        &mut self,
        session: SessionId,
        package: Vec<u8>,
    ) -> Result<(), BridgeError> {
        self.transport
            .broadcast(BridgeMessage::SigningPackage {
                session,
                package: package.clone(),
            })
            .await?;

        let expected = match self.sessions.get(&session) {
            Some(c) => c.message().to_vec(),
            None => return Ok(()),
        };
        let share = self.holder.sign(session, &package, &expected)?;
        if let Some(coordinator) = self.sessions.get_mut(&session) {
            if let Some(signature) = coordinator.add_share(self.directory.local(), &share)? {
                self.complete_session(session, signature).await?;
            }
        }
        Ok(())
    }

    /// The signed authorization is in hand: perform the chain action,
    /// then — and only then — write the processed record.
    async fn complete_session(
        &mut self,
        session: SessionId,
        signature: [u8; 64],
    ) -> Result<(), BridgeError> {
        self.sessions.remove(&session);
        self.session_refusals.remove(&session);

        let Some((digest, flight)) = self
            .in_flight
            .iter()
            .find(|(_, f)| f.session == Some(session))
            .map(|(d, f)| (*d, f.message.clone()))
        else {
            tracing::warn!(%session, "verified session has no pending authorization");
            return Ok(());
        };

        let action = match flight.intent {
            Intent::Mint => self.ledger.mint(&flight, &signature).await,
            Intent::Release => self.coin.broadcast_release(&flight, &signature).await,
        };

        match action {
            Ok(counterpart_tx) => {
                self.mark_processed(&flight, counterpart_tx)?;
                self.in_flight.remove(&digest);
                self.transport
                    .broadcast(BridgeMessage::ProcessedNotice {
                        intent: flight.intent,
                        source_tx: flight.source_tx,
                        counterpart_tx,
                        amount: flight.amount,
                    })
                    .await?;
                tracing::info!(intent = %flight.intent, source = %flight.source_tx,
                    counterpart = %counterpart_tx, "bridge action complete");
                Ok(())
            }
            Err(e) => {
                // Unmarked: the retry path picks it up next cycle.
                self.schedule_retry(digest);
                Err(BridgeError::Chain(e))
            }
        }
    }

    fn mark_processed(
        &self,
        message: &SigningMessage,
        counterpart_tx: TxHash,
    ) -> Result<(), BridgeError> {
        let record = ProcessedRecord {
            amount: message.amount,
            counterpart_tx,
            processed_at: Timestamp::now(),
        };
        match message.intent {
            Intent::Mint => self.store.mark_deposit_processed(&message.source_tx, &record)?,
            Intent::Release => self
                .store
                .mark_withdrawal_processed(&message.source_tx, &record)?,
        }
        Ok(())
    }

    fn schedule_retry(&mut self, digest: [u8; 32]) {
        if let Some(flight) = self.in_flight.get_mut(&digest) {
            flight.session = None;
            flight.retry_at = Timestamp::new(now_secs() + self.config.poll_interval_secs);
        }
    }

    /// Tear down a session that ended without a signature and queue the
    /// authorization for a fresh attempt (new session, new nonces).
    fn abandon_session(&mut self, session: SessionId) {
        self.sessions.remove(&session);
        self.session_refusals.remove(&session);
        self.holder.release(session);
        let digest = self
            .in_flight
            .iter()
            .find(|(_, f)| f.session == Some(session))
            .map(|(d, _)| *d);
        if let Some(digest) = digest {
            self.schedule_retry(digest);
        }
    }

    // ── Message dispatch ───────────────────────────────────────────────

    async fn dispatch(
        &mut self,
        from: ParticipantId,
        message: BridgeMessage,
    ) -> Result<(), BridgeError> {
        match message {
            BridgeMessage::SigningRequest {
                session,
                message,
                deadline_secs,
            } => self.on_signing_request(from, session, message, deadline_secs).await,
            BridgeMessage::SigningCommitment {
                session,
                commitment,
            } => self.on_commitment(from, session, &commitment).await,
            BridgeMessage::SigningPackage { session, package } => {
                self.on_package(from, session, &package).await
            }
            BridgeMessage::SignatureShare { session, share } => {
                self.on_share(from, session, &share).await
            }
            BridgeMessage::SigningRefusal { session } => {
                self.on_refusal(from, session);
                Ok(())
            }
            BridgeMessage::ProcessedNotice {
                intent,
                source_tx,
                counterpart_tx,
                amount,
            } => self.on_processed_notice(from, intent, source_tx, counterpart_tx, amount),
            BridgeMessage::DepositAttestation { event } => {
                tracing::debug!(from = %from, tx = %event.tx_hash, "peer attested deposit");
                Ok(())
            }
            BridgeMessage::WithdrawalAttestation { request } => {
                tracing::debug!(from = %from, tx = %request.tx_hash, "peer attested burn");
                Ok(())
            }
            // DKG traffic is a startup concern; here it is stale.
            other @ (BridgeMessage::DkgStart { .. }
            | BridgeMessage::DkgRound1 { .. }
            | BridgeMessage::DkgRound2 { .. }) => {
                tracing::debug!(from = %from, kind = other.kind(), "ignoring stale DKG message");
                Ok(())
            }
        }
    }

    // ── Participant role ───────────────────────────────────────────────

    async fn on_signing_request(
        &mut self,
        from: ParticipantId,
        session: SessionId,
        message: SigningMessage,
        deadline_secs: u64,
    ) -> Result<(), BridgeError> {
        if from != self.directory.coordinator() {
            tracing::warn!(from = %from, "signing request from non-coordinator, ignoring");
            return Ok(());
        }

        // The binding check: only sign what we ourselves saw confirm.
        if !self.registry.is_bound(&message) {
            tracing::warn!(%session, tx = %message.source_tx,
                "refusing unobserved authorization");
            self.transport
                .send(from, BridgeMessage::SigningRefusal { session })
                .await?;
            return Ok(());
        }

        let commitment = self.holder.commit(session, &mut OsRng)?;
        self.participant_sessions.insert(
            session,
            ParticipantSession {
                coordinator: from,
                expected: message.canonical_bytes(),
                deadline: Timestamp::new(now_secs() + deadline_secs),
            },
        );
        self.transport
            .send(
                from,
                BridgeMessage::SigningCommitment {
                    session,
                    commitment,
                },
            )
            .await?;
        Ok(())
    }

    async fn on_package(
        &mut self,
        from: ParticipantId,
        session: SessionId,
        package: &[u8],
    ) -> Result<(), BridgeError> {
        match self.participant_sessions.get(&session) {
            None => {
                tracing::debug!(%session, "package for unknown session");
                return Ok(());
            }
            Some(ps) if ps.coordinator != from => {
                tracing::warn!(from = %from, %session, "package from unexpected sender");
                return Ok(());
            }
            Some(_) => {}
        }
        let ps = self
            .participant_sessions
            .remove(&session)
            .expect("checked above");

        match self.holder.sign(session, package, &ps.expected) {
            Ok(share) => {
                self.transport
                    .send(from, BridgeMessage::SignatureShare { session, share })
                    .await?;
                Ok(())
            }
            Err(aqueduct_frost::FrostError::MessageMismatch) => {
                tracing::warn!(%session, "package message mismatch, refusing");
                self.transport
                    .send(from, BridgeMessage::SigningRefusal { session })
                    .await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    // ── Coordinator message handling ───────────────────────────────────

    async fn on_commitment(
        &mut self,
        from: ParticipantId,
        session: SessionId,
        commitment: &[u8],
    ) -> Result<(), BridgeError> {
        let sealed = match self.sessions.get_mut(&session) {
            Some(coordinator) => match coordinator.add_commitment(from, commitment) {
                Ok(sealed) => sealed,
                Err(e) => {
                    tracing::debug!(from = %from, %session, error = %e,
                        "commitment not accepted");
                    return Ok(());
                }
            },
            None => {
                tracing::debug!(%session, "commitment for unknown session");
                return Ok(());
            }
        };
        if let Some(package) = sealed {
            self.distribute_package(session, package).await?;
        }
        Ok(())
    }

    async fn on_share(
        &mut self,
        from: ParticipantId,
        session: SessionId,
        share: &[u8],
    ) -> Result<(), BridgeError> {
        let outcome = match self.sessions.get_mut(&session) {
            Some(coordinator) => coordinator.add_share(from, share),
            None => {
                tracing::debug!(%session, "share for unknown session");
                return Ok(());
            }
        };
        match outcome {
            Ok(Some(signature)) => self.complete_session(session, signature).await,
            Ok(None) => Ok(()),
            Err(e) => {
                tracing::warn!(from = %from, %session, error = %e, "share rejected");
                if self
                    .sessions
                    .get(&session)
                    .map(|c| c.state().is_terminal())
                    .unwrap_or(false)
                {
                    self.abandon_session(session);
                }
                Ok(())
            }
        }
    }

    fn on_refusal(&mut self, from: ParticipantId, session: SessionId) {
        if !self.sessions.contains_key(&session) {
            return;
        }
        let refusals = self.session_refusals.entry(session).or_insert(0);
        *refusals += 1;
        tracing::warn!(from = %from, %session, refusals = *refusals, "participant refused");

        // If refusals make the threshold unreachable, fail fast instead
        // of waiting out the deadline.
        let remaining = (self.directory.len() as u16).saturating_sub(*refusals);
        if remaining < self.config.threshold {
            if let Some(coordinator) = self.sessions.get_mut(&session) {
                coordinator.abort_mismatch();
            }
            self.abandon_session(session);
        }
    }

    /// A peer (the coordinator) completed the chain action; converge the
    /// local store so the pre-filter and status surfaces agree.
    fn on_processed_notice(
        &mut self,
        from: ParticipantId,
        intent: Intent,
        source_tx: TxHash,
        counterpart_tx: TxHash,
        amount: Amount,
    ) -> Result<(), BridgeError> {
        if from != self.directory.coordinator() {
            tracing::warn!(from = %from, "processed notice from non-coordinator, ignoring");
            return Ok(());
        }
        let record = ProcessedRecord {
            amount,
            counterpart_tx,
            processed_at: Timestamp::now(),
        };
        match intent {
            Intent::Mint => self.store.mark_deposit_processed(&source_tx, &record)?,
            Intent::Release => self.store.mark_withdrawal_processed(&source_tx, &record)?,
        }
        tracing::info!(%intent, source = %source_tx, "recorded peer-completed action");
        Ok(())
    }

    // ── Periodic housekeeping ──────────────────────────────────────────

    async fn on_tick(&mut self) -> Result<(), BridgeError> {
        let now = Timestamp::now();

        // Expire coordinator sessions past their deadline.
        let expired: Vec<SessionId> = self
            .sessions
            .iter_mut()
            .filter_map(|(sid, c)| c.expire(now).then_some(*sid))
            .collect();
        for session in expired {
            self.abandon_session(session);
        }

        // Release participant nonces for sessions that died upstream.
        let stale: Vec<SessionId> = self
            .participant_sessions
            .iter()
            .filter(|(_, ps)| ps.deadline <= now)
            .map(|(sid, _)| *sid)
            .collect();
        for session in stale {
            self.participant_sessions.remove(&session);
            self.holder.release(session);
            tracing::debug!(%session, "released nonces for expired session");
        }

        // Re-attempt authorizations whose session failed.
        let due: Vec<[u8; 32]> = self
            .in_flight
            .iter()
            .filter(|(_, f)| f.session.is_none() && f.retry_at <= now)
            .map(|(d, _)| *d)
            .collect();
        for digest in due {
            let already_done = {
                let flight = &self.in_flight[&digest];
                match flight.message.intent {
                    Intent::Mint => self.store.is_deposit_processed(&flight.message.source_tx)?,
                    Intent::Release => self
                        .store
                        .is_withdrawal_processed(&flight.message.source_tx)?,
                }
            };
            if already_done {
                self.in_flight.remove(&digest);
                continue;
            }
            self.open_session(digest).await?;
        }
        Ok(())
    }

    /// Deposit-address allocation for the front door: idempotent, next
    /// index per account, derived inside the store transaction.
    pub fn map_identity(
        &self,
        owner: &aqueduct_types::LedgerAddress,
    ) -> Result<aqueduct_types::AddressMapping, BridgeError> {
        Ok(self
            .store
            .map_identity(owner, self.config.account, self.deriver.as_ref())?)
    }
}
