//! Threshold signer for the Aqueduct bridge.
//!
//! T-of-N operators jointly authorize every mint and release. This crate
//! holds the protocol state machines — a two-round distributed key
//! generation ceremony and the two-round signing protocol — as pure,
//! I/O-free types; `aqueduct-node` drives them over the operator
//! transport. Curve arithmetic is delegated to `frost-ed25519`; what lives
//! here is the session lifecycle, round bookkeeping, nonce discipline, and
//! the abort semantics.
//!
//! The group's public key and aggregate signatures are plain 32/64-byte
//! Ed25519 values, so a 1-of-1 deployment (the [`signer::GroupSigner::Solo`]
//! arm) produces output indistinguishable from a full threshold group and
//! the orchestrator never branches on group size.

pub mod dkg;
pub mod error;
pub mod session;
pub mod signer;

pub use dkg::{DkgCeremony, DkgOutcome};
pub use error::FrostError;
pub use session::{AbortReason, SessionState, SigningCoordinator};
pub use signer::{GroupPublic, GroupSigner, OperatorShare, ShareHolder};
