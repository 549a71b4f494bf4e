//! End-to-end tests wiring real components over the in-process hub:
//! DKG → observation → signing → chain action → bookkeeping, across
//! multiple operator nodes that are normally separate processes.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;

use aqueduct_chain::{BurnRecord, ChainError, CoinChainRpc, HostLedgerRpc, IncomingTransfer};
use aqueduct_crypto::blake2b_256;
use aqueduct_frost::{GroupPublic, GroupSigner, ShareHolder};
use aqueduct_network::{
    local::LocalTransport, Inbound, LocalHub, OperatorDirectory, OperatorEntry,
};
use aqueduct_node::{establish_group_key, BridgeConfig, BridgeNode, DigestDeriver, RosterEntry};
use aqueduct_store::{BridgeStore, MappingStore, MemoryStore, MetaStore, ProcessedStore};
use aqueduct_store::{DEPOSIT_WATERMARK, WITHDRAWAL_WATERMARK};
use aqueduct_types::{
    Amount, CoinAddress, Height, LedgerAddress, NetworkId, ParticipantId, PublicKey,
    SigningMessage, TxHash,
};

// ---------------------------------------------------------------------------
// Chain mocks (shared by every operator, like the real chains are)
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CoinState {
    height: Height,
    transfers: Vec<IncomingTransfer>,
    releases: Vec<(SigningMessage, [u8; 64])>,
}

#[derive(Clone, Default)]
struct MockCoin {
    state: Arc<Mutex<CoinState>>,
}

impl CoinChainRpc for MockCoin {
    async fn height(&self) -> Result<Height, ChainError> {
        Ok(self.state.lock().unwrap().height)
    }

    async fn is_synchronized(&self) -> Result<bool, ChainError> {
        Ok(true)
    }

    async fn transfers(&self, from: Height, to: Height) -> Result<Vec<IncomingTransfer>, ChainError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .transfers
            .iter()
            .filter(|t| t.height >= from && t.height <= to)
            .cloned()
            .collect())
    }

    async fn broadcast_release(
        &self,
        authorization: &SigningMessage,
        signature: &[u8; 64],
    ) -> Result<TxHash, ChainError> {
        let mut state = self.state.lock().unwrap();
        state.releases.push((authorization.clone(), *signature));
        Ok(TxHash::new(blake2b_256(&authorization.canonical_bytes())))
    }
}

#[derive(Default)]
struct LedgerState {
    height: Height,
    burns: Vec<BurnRecord>,
    mints: Vec<(SigningMessage, [u8; 64])>,
}

#[derive(Clone, Default)]
struct MockLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl HostLedgerRpc for MockLedger {
    async fn height(&self) -> Result<Height, ChainError> {
        Ok(self.state.lock().unwrap().height)
    }

    async fn is_synchronized(&self) -> Result<bool, ChainError> {
        Ok(true)
    }

    async fn burn_events(&self, from: Height, to: Height) -> Result<Vec<BurnRecord>, ChainError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .burns
            .iter()
            .filter(|b| b.height >= from && b.height <= to)
            .cloned()
            .collect())
    }

    async fn mint(
        &self,
        authorization: &SigningMessage,
        signature: &[u8; 64],
    ) -> Result<TxHash, ChainError> {
        let mut state = self.state.lock().unwrap();
        state.mints.push((authorization.clone(), *signature));
        Ok(TxHash::new(blake2b_256(&authorization.canonical_bytes())))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

fn pid(i: u16) -> ParticipantId {
    ParticipantId::new(i).unwrap()
}

fn directory(local: u16, n: u16) -> Arc<OperatorDirectory> {
    let roster = (1..=n)
        .map(|i| OperatorEntry {
            id: pid(i),
            endpoint: format!("in-process-{i}"),
            identity_key: PublicKey([i as u8; 32]),
        })
        .collect();
    Arc::new(OperatorDirectory::new(pid(local), roster).unwrap())
}

struct Operator {
    directory: Arc<OperatorDirectory>,
    transport: LocalTransport,
    inbound: Inbound,
    holder: ShareHolder,
}

/// Run the real DKG over the hub and return every operator's pieces plus
/// the agreed group key.
async fn dkg_operators(
    hub: &Arc<LocalHub>,
    n: u16,
    threshold: u16,
) -> (Vec<Operator>, GroupPublic) {
    let mut joined = Vec::new();
    for i in 1..=n {
        let (transport, inbound) = hub.join(pid(i));
        joined.push((directory(i, n), transport, inbound));
    }

    let mut handles = Vec::new();
    for (dir, transport, mut inbound) in joined {
        handles.push(tokio::spawn(async move {
            let share = establish_group_key(
                &dir,
                threshold,
                Duration::from_secs(10),
                &transport,
                &mut inbound,
            )
            .await
            .expect("DKG completes");
            (dir, transport, inbound, share)
        }));
    }

    let mut operators = Vec::new();
    let mut group_keys = Vec::new();
    for handle in handles {
        let (directory, transport, inbound, share) = handle.await.unwrap();
        group_keys.push(share.group_key_bytes());
        operators.push(Operator {
            directory,
            transport,
            inbound,
            holder: ShareHolder::new(GroupSigner::Threshold(share)),
        });
    }

    // Every operator must have derived the identical group key.
    assert!(group_keys.windows(2).all(|w| w[0] == w[1]));
    let group = operators[0].holder.group_public();
    (operators, group)
}

fn config(index: u16, n: u16, threshold: u16) -> BridgeConfig {
    BridgeConfig {
        network: NetworkId::Dev,
        data_dir: "/tmp/aqueduct-it".into(),
        participant_index: index,
        threshold,
        operator_mnemonic: String::new(),
        min_confirmations: 3,
        poll_interval_secs: 1,
        session_timeout_secs: 5,
        dkg_round_timeout_secs: 10,
        account: 0,
        roster: (1..=n)
            .map(|i| RosterEntry {
                index: i,
                endpoint: format!("in-process-{i}"),
                identity_key: "aa".repeat(32),
            })
            .collect(),
    }
}

/// A store pre-seeded with Alice's deposit-address mapping and watermarks
/// below the test events, so the observers treat them as new.
fn seeded_store(deriver: &DigestDeriver) -> (Arc<MemoryStore>, CoinAddress, LedgerAddress) {
    let store = Arc::new(MemoryStore::new());
    let owner = LedgerAddress::new("ldgr1alice");
    let mapping = store.map_identity(&owner, 0, deriver).unwrap();
    store.set_watermark(DEPOSIT_WATERMARK, 90).unwrap();
    store.set_watermark(WITHDRAWAL_WATERMARK, 90).unwrap();
    (store, mapping.deposit_address, owner)
}

fn spawn_node(
    operator: Operator,
    store: Arc<dyn BridgeStore>,
    coin: MockCoin,
    ledger: MockLedger,
    n: u16,
    threshold: u16,
) -> broadcast::Sender<()> {
    let (shutdown, _) = broadcast::channel(1);
    let index = operator.directory.local().index();
    let node = BridgeNode::new(
        config(index, n, threshold),
        operator.directory,
        store,
        Arc::new(DigestDeriver::new(NetworkId::Dev)),
        coin,
        ledger,
        operator.transport,
        operator.inbound,
        operator.holder,
    );
    let handle_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = node.run(handle_shutdown).await;
    });
    shutdown
}

async fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn deposit_flow_with_one_operator_offline() {
    let hub = LocalHub::new();
    let (mut operators, group) = dkg_operators(&hub, 3, 2).await;

    // Operator 3 goes offline after DKG; {1, 2} must still mint.
    let _offline = operators.pop().unwrap();
    hub.disconnect(pid(3));

    let coin = MockCoin::default();
    let ledger = MockLedger::default();
    let deriver = DigestDeriver::new(NetworkId::Dev);

    let deposit_tx = TxHash::new([0xD1; 32]);
    let mut stores = Vec::new();
    let mut shutdowns = Vec::new();
    let mut deposit_address = None;
    for operator in operators {
        let (store, address, _owner) = seeded_store(&deriver);
        stores.push(Arc::clone(&store));
        deposit_address = Some(address);
        shutdowns.push(spawn_node(
            operator,
            store,
            coin.clone(),
            ledger.clone(),
            3,
            2,
        ));
    }
    coin.state.lock().unwrap().transfers.push(IncomingTransfer {
        tx_hash: deposit_tx,
        amount: Amount::new(5_000_000),
        height: 100,
        // Every operator derived the same mapping, so one address serves.
        deposit_address: deposit_address.expect("at least one operator"),
    });
    // Deposit at height 100 with 3 confirmations once the chain is at 102.
    coin.state.lock().unwrap().height = 102;
    ledger.state.lock().unwrap().height = 102;

    let minted = wait_until(Duration::from_secs(20), || {
        ledger.state.lock().unwrap().mints.len() == 1
    })
    .await;
    assert!(minted, "the mint was submitted");

    // The signature verifies under the DKG group key and binds the event.
    {
        let state = ledger.state.lock().unwrap();
        let (message, signature) = &state.mints[0];
        assert_eq!(message.source_tx, deposit_tx);
        assert_eq!(message.amount, Amount::new(5_000_000));
        assert!(group.verify(&message.canonical_bytes(), signature));
    }

    // Both stores converge on the processed record (notice included).
    let converged = wait_until(Duration::from_secs(10), || {
        stores
            .iter()
            .all(|s| s.is_deposit_processed(&deposit_tx).unwrap())
    })
    .await;
    assert!(converged, "every operator recorded the deposit as processed");

    // More poll cycles pass; still exactly one mint.
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(ledger.state.lock().unwrap().mints.len(), 1);

    for shutdown in shutdowns {
        let _ = shutdown.send(());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn withdrawal_flow_releases_exactly_once() {
    let hub = LocalHub::new();
    let (operators, group) = dkg_operators(&hub, 3, 2).await;

    let coin = MockCoin::default();
    let ledger = MockLedger::default();
    let deriver = DigestDeriver::new(NetworkId::Dev);

    let burn_tx = TxHash::new([0xB1; 32]);
    let destination = CoinAddress::new("aqdev_user_payout_address");
    ledger.state.lock().unwrap().burns.push(BurnRecord {
        tx_hash: burn_tx,
        amount: Amount::new(750_000),
        height: 95,
        destination: destination.clone(),
        requester: LedgerAddress::new("ldgr1alice"),
    });

    let mut stores = Vec::new();
    let mut shutdowns = Vec::new();
    for operator in operators {
        let (store, _, _) = seeded_store(&deriver);
        stores.push(Arc::clone(&store));
        shutdowns.push(spawn_node(
            operator,
            store,
            coin.clone(),
            ledger.clone(),
            3,
            2,
        ));
    }
    coin.state.lock().unwrap().height = 102;
    ledger.state.lock().unwrap().height = 102;

    let released = wait_until(Duration::from_secs(20), || {
        coin.state.lock().unwrap().releases.len() == 1
    })
    .await;
    assert!(released, "the release was broadcast");

    {
        let state = coin.state.lock().unwrap();
        let (message, signature) = &state.releases[0];
        assert_eq!(message.source_tx, burn_tx);
        assert_eq!(message.recipient, destination.as_str());
        assert!(group.verify(&message.canonical_bytes(), signature));
    }

    let converged = wait_until(Duration::from_secs(10), || {
        stores
            .iter()
            .all(|s| s.is_withdrawal_processed(&burn_tx).unwrap())
    })
    .await;
    assert!(converged);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(coin.state.lock().unwrap().releases.len(), 1);

    for shutdown in shutdowns {
        let _ = shutdown.send(());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn restart_resumes_without_reminting() {
    use aqueduct_store_lmdb::LmdbStore;

    let dir = tempfile::tempdir().unwrap();
    let deriver = DigestDeriver::new(NetworkId::Dev);
    let coin = MockCoin::default();
    let ledger = MockLedger::default();
    let owner = LedgerAddress::new("ldgr1alice");

    // One LMDB environment, shared the way a data dir is across a
    // process restart. (Reopen-from-disk is covered by the store's own
    // tests; here the node's runtime state is what restarts.)
    let store: Arc<dyn BridgeStore> =
        Arc::new(LmdbStore::open(dir.path(), 64 * 1024 * 1024).unwrap());
    let mapping = store.map_identity(&owner, 0, &deriver).unwrap();
    let deposit_address = mapping.deposit_address;
    store.set_watermark(DEPOSIT_WATERMARK, 90).unwrap();
    store.set_watermark(WITHDRAWAL_WATERMARK, 90).unwrap();

    let deposit_tx = TxHash::new([0xAB; 32]);
    coin.state.lock().unwrap().transfers.push(IncomingTransfer {
        tx_hash: deposit_tx,
        amount: Amount::new(900_000),
        height: 100,
        deposit_address: deposit_address.clone(),
    });
    coin.state.lock().unwrap().height = 102;
    ledger.state.lock().unwrap().height = 102;

    {
        let hub = LocalHub::new();
        let (transport, inbound) = hub.join(pid(1));
        let operator = Operator {
            directory: directory(1, 1),
            transport,
            inbound,
            holder: ShareHolder::new(GroupSigner::solo_from_seed(&[0x66; 32])),
        };
        let shutdown = spawn_node(operator, Arc::clone(&store), coin.clone(), ledger.clone(), 1, 1);

        assert!(
            wait_until(Duration::from_secs(20), || {
                ledger.state.lock().unwrap().mints.len() == 1
            })
            .await
        );
        // Kill the node mid-life; the durable state survives.
        let _ = shutdown.send(());
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    // Restart: fresh node state over the same durable store. The first
    // deposit must not mint again; a new deposit must still flow.
    assert!(store.is_deposit_processed(&deposit_tx).unwrap());

    let second_tx = TxHash::new([0xAC; 32]);
    {
        let mut state = coin.state.lock().unwrap();
        state.transfers.push(IncomingTransfer {
            tx_hash: second_tx,
            amount: Amount::new(100_000),
            height: 105,
            deposit_address,
        });
        state.height = 110;
    }

    let hub = LocalHub::new();
    let (transport, inbound) = hub.join(pid(1));
    let operator = Operator {
        directory: directory(1, 1),
        transport,
        inbound,
        holder: ShareHolder::new(GroupSigner::solo_from_seed(&[0x66; 32])),
    };
    let shutdown = spawn_node(operator, Arc::clone(&store), coin.clone(), ledger.clone(), 1, 1);

    assert!(
        wait_until(Duration::from_secs(20), || {
            store.is_deposit_processed(&second_tx).unwrap()
        })
        .await
    );
    // Exactly one mint per deposit, across the restart.
    let mints = ledger.state.lock().unwrap().mints.clone();
    assert_eq!(mints.len(), 2);
    assert!(mints.iter().any(|(m, _)| m.source_tx == deposit_tx));
    assert!(mints.iter().any(|(m, _)| m.source_tx == second_tx));

    let _ = shutdown.send(());
}

#[tokio::test(flavor = "multi_thread")]
async fn solo_operator_runs_the_same_flow() {
    let hub = LocalHub::new();
    let (transport, inbound) = hub.join(pid(1));
    let holder = ShareHolder::new(GroupSigner::solo_from_seed(&[0x55; 32]));
    let group = holder.group_public();

    let coin = MockCoin::default();
    let ledger = MockLedger::default();
    let deriver = DigestDeriver::new(NetworkId::Dev);
    let (store, deposit_address, _) = seeded_store(&deriver);

    let deposit_tx = TxHash::new([0x50; 32]);
    coin.state.lock().unwrap().transfers.push(IncomingTransfer {
        tx_hash: deposit_tx,
        amount: Amount::new(123_456),
        height: 100,
        deposit_address,
    });
    coin.state.lock().unwrap().height = 102;
    ledger.state.lock().unwrap().height = 102;

    let operator = Operator {
        directory: directory(1, 1),
        transport,
        inbound,
        holder,
    };
    let store_dyn: Arc<dyn BridgeStore> = store.clone();
    let shutdown = spawn_node(
        operator,
        store_dyn,
        coin.clone(),
        ledger.clone(),
        1,
        1,
    );

    let minted = wait_until(Duration::from_secs(20), || {
        ledger.state.lock().unwrap().mints.len() == 1
    })
    .await;
    assert!(minted);

    {
        let state = ledger.state.lock().unwrap();
        let (message, signature) = &state.mints[0];
        assert!(group.verify(&message.canonical_bytes(), signature));
    }
    assert!(store.is_deposit_processed(&deposit_tx).unwrap());

    let _ = shutdown.send(());
}
