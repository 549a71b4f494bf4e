//! TCP transport between operator endpoints.
//!
//! Frames are `u32-LE length ‖ bincode(Envelope)`. Each peer gets one
//! outbound queue drained by a task that connects lazily, reconnects with
//! capped exponential backoff, and retries a frame a bounded number of
//! times before dropping it — a peer that stays unreachable for a round
//! just contributes nothing. The accept side verifies every envelope
//! against the directory and drops duplicate round deliveries before
//! anything reaches the inbound queue.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};

use aqueduct_types::{NetworkId, ParticipantId, PrivateKey};

use crate::transport::{Inbound, Transport};
use crate::{BridgeMessage, Envelope, NetworkError, OperatorDirectory, RoundDedup};

/// Frames above this size are rejected as malformed.
const MAX_FRAME_BYTES: u32 = 1024 * 1024;

/// Timeout for one outbound TCP connection attempt.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// How often a frame is retried against a dead connection before being
/// dropped.
const RESEND_ATTEMPTS: u32 = 5;

/// Ceiling for the reconnect backoff.
const RECONNECT_BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Outbound queue depth per peer.
const OUTBOUND_QUEUE: usize = 256;

/// TCP implementation of [`Transport`].
pub struct TcpTransport {
    directory: Arc<OperatorDirectory>,
    network: NetworkId,
    identity_seed: [u8; 32],
    outbound: std::collections::HashMap<ParticipantId, mpsc::Sender<Vec<u8>>>,
}

impl TcpTransport {
    /// Bind the local endpoint, spawn the accept loop and one outbound
    /// task per peer, and return the transport plus the inbound stream of
    /// verified messages.
    pub async fn spawn(
        directory: Arc<OperatorDirectory>,
        network: NetworkId,
        identity_key: &PrivateKey,
        shutdown: &broadcast::Sender<()>,
    ) -> Result<(Self, Inbound), NetworkError> {
        let local = directory
            .get(directory.local())
            .ok_or(NetworkError::PeerNotFound(directory.local()))?;
        let listener = TcpListener::bind(&local.endpoint)
            .await
            .map_err(|e| NetworkError::ConnectionFailed(format!("bind {}: {e}", local.endpoint)))?;
        tracing::info!(endpoint = %local.endpoint, "operator transport listening");

        let (inbound_tx, inbound_rx) = mpsc::channel(256);
        let dedup = Arc::new(Mutex::new(RoundDedup::default()));

        // Accept loop.
        {
            let directory = Arc::clone(&directory);
            let dedup = Arc::clone(&dedup);
            let mut shutdown_rx = shutdown.subscribe();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = shutdown_rx.recv() => break,
                        accepted = listener.accept() => match accepted {
                            Ok((stream, addr)) => {
                                tracing::debug!(peer = %addr, "inbound connection");
                                spawn_read_loop(
                                    stream,
                                    Arc::clone(&directory),
                                    network,
                                    Arc::clone(&dedup),
                                    inbound_tx.clone(),
                                );
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "accept failed");
                            }
                        }
                    }
                }
            });
        }

        // One outbound queue + writer task per peer.
        let mut outbound = std::collections::HashMap::new();
        for peer in directory.peers() {
            let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
            outbound.insert(peer.id, tx);
            tokio::spawn(outbound_writer(
                peer.id,
                peer.endpoint.clone(),
                rx,
                shutdown.subscribe(),
            ));
        }

        Ok((
            Self {
                directory,
                network,
                identity_seed: identity_key.0,
                outbound,
            },
            inbound_rx,
        ))
    }

    fn seal(&self, message: &BridgeMessage) -> Result<Vec<u8>, NetworkError> {
        let key = PrivateKey(self.identity_seed);
        let envelope = Envelope::seal(self.directory.local(), self.network, message, &key)?;
        envelope.encode()
    }
}

impl Transport for TcpTransport {
    async fn send(&self, to: ParticipantId, message: BridgeMessage) -> Result<(), NetworkError> {
        let queue = self
            .outbound
            .get(&to)
            .ok_or(NetworkError::PeerNotFound(to))?;
        let frame = self.seal(&message)?;
        queue
            .send(frame)
            .await
            .map_err(|_| NetworkError::ChannelClosed)
    }

    async fn broadcast(&self, message: BridgeMessage) -> Result<(), NetworkError> {
        let frame = self.seal(&message)?;
        for (peer, queue) in &self.outbound {
            if queue.send(frame.clone()).await.is_err() {
                tracing::warn!(peer = %peer, "outbound queue closed");
            }
        }
        Ok(())
    }
}

fn spawn_read_loop(
    stream: TcpStream,
    directory: Arc<OperatorDirectory>,
    network: NetworkId,
    dedup: Arc<Mutex<RoundDedup>>,
    inbound_tx: mpsc::Sender<(ParticipantId, BridgeMessage)>,
) {
    tokio::spawn(async move {
        let mut stream = stream;
        loop {
            match read_frame(&mut stream).await {
                Ok(Some(frame)) => {
                    let envelope = match Envelope::decode(&frame) {
                        Ok(env) => env,
                        Err(e) => {
                            tracing::warn!(error = %e, "dropping malformed frame");
                            break;
                        }
                    };
                    let sender = envelope.sender;
                    let message = match envelope.verify_and_open(&directory, network) {
                        Ok(msg) => msg,
                        Err(e) => {
                            tracing::warn!(error = %e, "rejected envelope");
                            continue;
                        }
                    };
                    let duplicate = {
                        let mut dedup = dedup.lock().expect("dedup lock");
                        dedup.is_duplicate(message.dedup_key(sender))
                    };
                    if duplicate {
                        tracing::debug!(from = %sender, kind = message.kind(),
                            "dropping duplicate delivery");
                        continue;
                    }
                    if inbound_tx.send((sender, message)).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(error = %e, "connection closed");
                    break;
                }
            }
        }
    });
}

async fn read_frame(stream: &mut TcpStream) -> std::io::Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u32::from_le_bytes(len_buf);
    if len == 0 || len > MAX_FRAME_BYTES {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame length {len} out of bounds"),
        ));
    }
    let mut frame = vec![0u8; len as usize];
    stream.read_exact(&mut frame).await?;
    Ok(Some(frame))
}

async fn write_frame(stream: &mut TcpStream, frame: &[u8]) -> std::io::Result<()> {
    stream.write_all(&(frame.len() as u32).to_le_bytes()).await?;
    stream.write_all(frame).await?;
    stream.flush().await
}

/// Drains one peer's outbound queue, reconnecting as needed.
async fn outbound_writer(
    peer: ParticipantId,
    endpoint: String,
    mut queue: mpsc::Receiver<Vec<u8>>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut stream: Option<TcpStream> = None;
    loop {
        let frame = tokio::select! {
            _ = shutdown.recv() => break,
            frame = queue.recv() => match frame {
                Some(f) => f,
                None => break,
            },
        };

        let mut attempt = 0u32;
        loop {
            if stream.is_none() {
                match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&endpoint)).await {
                    Ok(Ok(s)) => {
                        tracing::debug!(peer = %peer, endpoint = %endpoint, "peer connected");
                        stream = Some(s);
                    }
                    Ok(Err(e)) => {
                        tracing::debug!(peer = %peer, error = %e, "connect failed");
                    }
                    Err(_) => {
                        tracing::debug!(peer = %peer, "connect timed out");
                    }
                }
            }

            if let Some(s) = stream.as_mut() {
                match write_frame(s, &frame).await {
                    Ok(()) => break,
                    Err(e) => {
                        tracing::debug!(peer = %peer, error = %e, "write failed, reconnecting");
                        stream = None;
                    }
                }
            }

            attempt += 1;
            if attempt > RESEND_ATTEMPTS {
                tracing::warn!(peer = %peer, "dropping frame after {RESEND_ATTEMPTS} attempts");
                break;
            }
            let backoff = Duration::from_millis(200)
                .saturating_mul(1 << attempt.min(7))
                .min(RECONNECT_BACKOFF_CAP);
            tokio::select! {
                _ = shutdown.recv() => return,
                _ = tokio::time::sleep(backoff) => {}
            }
        }
    }
    tracing::debug!(peer = %peer, "outbound writer stopped");
}
