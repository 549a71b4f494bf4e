//! Ed25519 operator identity keys.
//!
//! Each operator authenticates on the transport with a long-lived Ed25519
//! key. The key is either generated fresh (dev) or derived from the
//! operator's BIP39 mnemonic, so the same phrase that identifies the
//! operator on the host ledger also fixes its transport identity.

use bip39::Mnemonic;
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use sha2::Sha512;
use thiserror::Error;

use aqueduct_types::{KeyPair, PrivateKey, PublicKey, Signature};

type HmacSha512 = Hmac<Sha512>;

/// Derivation path tag for the operator identity key.
const IDENTITY_PATH: &str = "m/44'/9041'/0'/0/0";

/// Errors arising from identity-key derivation.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid mnemonic phrase: {0}")]
    InvalidMnemonic(String),

    #[error("key derivation failed: {0}")]
    DerivationFailed(String),
}

/// Generate a new 24-word BIP39 mnemonic from 256-bit entropy.
pub fn generate_mnemonic() -> Result<String, IdentityError> {
    let mut entropy = [0u8; 32];
    rand::RngCore::fill_bytes(&mut OsRng, &mut entropy);
    let mnemonic = Mnemonic::from_entropy(&entropy)
        .map_err(|e| IdentityError::DerivationFailed(e.to_string()))?;
    Ok(mnemonic.to_string())
}

/// Generate a new Ed25519 key pair from a secure random source.
pub fn generate_keypair() -> KeyPair {
    let signing_key = SigningKey::generate(&mut OsRng);
    let verifying_key = signing_key.verifying_key();
    KeyPair {
        public: PublicKey(verifying_key.to_bytes()),
        private: PrivateKey(signing_key.to_bytes()),
    }
}

/// Derive a key pair from a 32-byte seed (deterministic).
pub fn keypair_from_seed(seed: &[u8; 32]) -> KeyPair {
    let signing_key = SigningKey::from_bytes(seed);
    let verifying_key = signing_key.verifying_key();
    KeyPair {
        public: PublicKey(verifying_key.to_bytes()),
        private: PrivateKey(signing_key.to_bytes()),
    }
}

/// Derive the operator identity key pair from a BIP39 mnemonic phrase.
///
/// Process:
/// 1. Validate the mnemonic and derive the BIP39 seed (empty passphrase)
/// 2. Apply HMAC-SHA512 keyed with the derivation path to the seed
/// 3. Take the first 32 bytes as the Ed25519 secret key
pub fn keypair_from_mnemonic(mnemonic: &str) -> Result<KeyPair, IdentityError> {
    let mnemonic = Mnemonic::parse_normalized(mnemonic)
        .map_err(|e| IdentityError::InvalidMnemonic(e.to_string()))?;

    let seed = mnemonic.to_seed_normalized("");

    let mut mac = HmacSha512::new_from_slice(IDENTITY_PATH.as_bytes())
        .map_err(|e| IdentityError::DerivationFailed(e.to_string()))?;
    mac.update(&seed);
    let derived = mac.finalize().into_bytes();

    let mut secret = [0u8; 32];
    secret.copy_from_slice(&derived[..32]);
    Ok(keypair_from_seed(&secret))
}

/// Sign a message with a private key, returning the signature.
pub fn sign_message(message: &[u8], private_key: &PrivateKey) -> Signature {
    let signing_key = SigningKey::from_bytes(&private_key.0);
    let sig = signing_key.sign(message);
    Signature(sig.to_bytes())
}

/// Verify a signature against a message and public key.
///
/// Returns `true` if the signature is valid, `false` otherwise, including
/// for malformed public keys.
pub fn verify_signature(message: &[u8], signature: &Signature, public_key: &PublicKey) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_bytes(&public_key.0) else {
        return false;
    };
    let dalek_sig = ed25519_dalek::Signature::from_bytes(&signature.0);
    verifying_key.verify(message, &dalek_sig).is_ok()
}
