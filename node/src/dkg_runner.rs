//! Drives the DKG ceremony over the operator transport at startup.
//!
//! The coordinator announces the ceremony (and any restart after
//! exclusions); every participant then runs the two rounds symmetrically.
//! A peer that fails to deliver a valid package before the round deadline
//! is excluded: the coordinator re-announces with the surviving roster
//! while at least `threshold` operators remain, otherwise the deployment
//! is dead on arrival and startup fails.

use std::time::Duration;

use rand::rngs::OsRng;
use rand::RngCore;
use tokio::time::Instant;

use aqueduct_frost::{DkgCeremony, GroupSigner, OperatorShare};
use aqueduct_network::{BridgeMessage, Inbound, OperatorDirectory, Transport};
use aqueduct_types::{ParticipantId, SessionId};

use crate::BridgeError;

enum RoundOutcome {
    Done(OperatorShare),
    TimedOut(Vec<ParticipantId>),
    /// The coordinator restarted with a new roster mid-round.
    Superseded {
        ceremony: SessionId,
        roster: Vec<ParticipantId>,
        threshold: u16,
    },
}

/// Load this operator's share from `share_path`, or run DKG to create it.
///
/// A roster of one short-circuits to the solo signer derived from the
/// operator identity seed; a threshold ceremony needs at least two
/// parties by construction.
pub async fn load_or_establish_group_key<T: Transport>(
    directory: &OperatorDirectory,
    threshold: u16,
    round_timeout: Duration,
    share_path: &std::path::Path,
    identity_seed: &[u8; 32],
    transport: &T,
    inbound: &mut Inbound,
) -> Result<GroupSigner, BridgeError> {
    if directory.len() == 1 {
        tracing::info!("single-operator deployment, using solo signer");
        return Ok(GroupSigner::solo_from_seed(identity_seed));
    }

    if share_path.exists() {
        let bytes = std::fs::read(share_path)?;
        let share = OperatorShare::from_bytes(&bytes)?;
        tracing::info!(path = %share_path.display(), "loaded operator share");
        return Ok(GroupSigner::Threshold(share));
    }

    let share = establish_group_key(directory, threshold, round_timeout, transport, inbound)
        .await?;
    std::fs::write(share_path, share.to_bytes()?)?;
    tracing::info!(path = %share_path.display(),
        group_key = %hex::encode(share.group_key_bytes()),
        "DKG complete, operator share persisted");
    Ok(GroupSigner::Threshold(share))
}

/// Run the DKG protocol to completion (possibly across restarts).
pub async fn establish_group_key<T: Transport>(
    directory: &OperatorDirectory,
    threshold: u16,
    round_timeout: Duration,
    transport: &T,
    inbound: &mut Inbound,
) -> Result<OperatorShare, BridgeError> {
    let local = directory.local();

    if directory.is_coordinator() {
        let mut roster = directory.participant_ids();
        loop {
            let ceremony = fresh_session_id();
            tracing::info!(%ceremony, operators = roster.len(), threshold,
                "announcing DKG ceremony");
            transport
                .broadcast(BridgeMessage::DkgStart {
                    ceremony,
                    roster: roster.clone(),
                    threshold,
                })
                .await?;

            match run_ceremony(
                local, ceremony, &roster, threshold, round_timeout, transport, inbound,
            )
            .await?
            {
                RoundOutcome::Done(share) => return Ok(share),
                RoundOutcome::TimedOut(missing) => {
                    tracing::warn!(?missing, "excluding unresponsive operators");
                    roster.retain(|p| !missing.contains(p));
                    if (roster.len() as u16) < threshold {
                        return Err(BridgeError::DkgFatal(format!(
                            "{} operators remain, threshold is {threshold}",
                            roster.len()
                        )));
                    }
                }
                RoundOutcome::Superseded { .. } => {
                    // Only the coordinator announces; it cannot supersede
                    // itself.
                    return Err(BridgeError::DkgFatal(
                        "conflicting ceremony announcement".into(),
                    ));
                }
            }
        }
    } else {
        // Wait for the coordinator's announcement, then participate.
        // Restarts arrive as fresh announcements.
        let mut announced: Option<(SessionId, Vec<ParticipantId>, u16)> = None;
        loop {
            let (ceremony, roster, threshold) = match announced.take() {
                Some(a) => a,
                None => wait_for_start(round_timeout, inbound).await?,
            };
            if !roster.contains(&local) {
                return Err(BridgeError::DkgFatal(
                    "this operator was excluded from the ceremony".into(),
                ));
            }

            match run_ceremony(
                local, ceremony, &roster, threshold, round_timeout, transport, inbound,
            )
            .await?
            {
                RoundOutcome::Done(share) => return Ok(share),
                RoundOutcome::TimedOut(_) => {
                    tracing::warn!("ceremony timed out, waiting for restart");
                }
                RoundOutcome::Superseded {
                    ceremony,
                    roster,
                    threshold,
                } => {
                    announced = Some((ceremony, roster, threshold));
                }
            }
        }
    }
}

fn fresh_session_id() -> SessionId {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    SessionId::new(bytes)
}

async fn wait_for_start(
    round_timeout: Duration,
    inbound: &mut Inbound,
) -> Result<(SessionId, Vec<ParticipantId>, u16), BridgeError> {
    let deadline = Instant::now() + round_timeout * 2;
    loop {
        let message = tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {
                return Err(BridgeError::DkgFatal(
                    "no ceremony announcement from coordinator".into(),
                ));
            }
            message = inbound.recv() => message.ok_or(BridgeError::Transport(
                aqueduct_network::NetworkError::ChannelClosed,
            ))?,
        };
        match message.1 {
            BridgeMessage::DkgStart {
                ceremony,
                roster,
                threshold,
            } => return Ok((ceremony, roster, threshold)),
            other => {
                tracing::debug!(kind = other.kind(), "ignoring pre-DKG message");
            }
        }
    }
}

async fn run_ceremony<T: Transport>(
    local: ParticipantId,
    ceremony_id: SessionId,
    roster: &[ParticipantId],
    threshold: u16,
    round_timeout: Duration,
    transport: &T,
    inbound: &mut Inbound,
) -> Result<RoundOutcome, BridgeError> {
    let (mut ceremony, round1) = DkgCeremony::new(local, roster, threshold, &mut OsRng)?;
    transport
        .broadcast(BridgeMessage::DkgRound1 {
            ceremony: ceremony_id,
            package: round1,
        })
        .await?;

    // Both rounds fit inside one generous window; exclusion granularity
    // is "who was missing when it expired".
    let deadline = Instant::now() + round_timeout * 2;
    loop {
        let (from, message) = tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {
                return Ok(RoundOutcome::TimedOut(ceremony.missing()));
            }
            message = inbound.recv() => match message {
                Some(m) => m,
                None => {
                    return Err(BridgeError::Transport(
                        aqueduct_network::NetworkError::ChannelClosed,
                    ));
                }
            },
        };

        match message {
            BridgeMessage::DkgRound1 { ceremony: cid, package } if cid == ceremony_id => {
                match ceremony.receive_round1(from, &package) {
                    Ok(Some(outgoing)) => {
                        for (recipient, package) in outgoing {
                            transport
                                .send(
                                    recipient,
                                    BridgeMessage::DkgRound2 {
                                        ceremony: ceremony_id,
                                        package,
                                    },
                                )
                                .await?;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        // An invalid package counts as undelivered; its
                        // sender stays on the missing list.
                        tracing::warn!(%from, error = %e, "rejected DKG round-1 package");
                    }
                }
            }
            BridgeMessage::DkgRound2 { ceremony: cid, package } if cid == ceremony_id => {
                match ceremony.receive_round2(from, &package) {
                    Ok(Some(outcome)) => return Ok(RoundOutcome::Done(outcome.share)),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(%from, error = %e, "rejected DKG round-2 package");
                    }
                }
            }
            BridgeMessage::DkgStart {
                ceremony: new_ceremony,
                roster,
                threshold,
            } if new_ceremony != ceremony_id => {
                return Ok(RoundOutcome::Superseded {
                    ceremony: new_ceremony,
                    roster,
                    threshold,
                });
            }
            other => {
                tracing::debug!(kind = other.kind(), "ignoring message during DKG");
            }
        }
    }
}
