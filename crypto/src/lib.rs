//! Hashing and operator-identity cryptography for the Aqueduct bridge.
//!
//! Operator identity keys sign transport envelopes; the threshold group key
//! lives in `aqueduct-frost` and never passes through here.

pub mod hash;
pub mod identity;

pub use hash::{blake2b_256, blake2b_256_multi};
pub use identity::{
    generate_keypair, generate_mnemonic, keypair_from_mnemonic, keypair_from_seed, sign_message,
    verify_signature, IdentityError,
};
