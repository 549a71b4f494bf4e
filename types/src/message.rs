//! Canonical signing-message encoding.
//!
//! The byte string the operator group actually signs. Every field that
//! distinguishes one asset movement from another is bound here, most
//! importantly the source transaction hash, which makes the message unique
//! per observed event: the target chain can therefore reject a proof it
//! has already consumed, and a forged request cannot reuse a signature.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Amount, CoinAddress, LedgerAddress, NetworkId, TxHash};

/// Domain tag prefixed to every canonical encoding.
const DOMAIN_TAG: &[u8] = b"aqueduct/v1/authorization";

/// What the signature authorizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Intent {
    /// Mint wrapped balance on the host ledger.
    Mint,
    /// Release the original coin on the coin chain.
    Release,
}

impl Intent {
    fn tag(&self) -> u8 {
        match self {
            Self::Mint => 0,
            Self::Release => 1,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mint => write!(f, "mint"),
            Self::Release => write!(f, "release"),
        }
    }
}

/// One mint or release authorization, in the form the group signs it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SigningMessage {
    pub intent: Intent,
    pub amount: Amount,
    /// Mint: the host-ledger recipient. Release: the coin-chain
    /// destination.
    pub recipient: String,
    /// The source-chain transaction this authorization answers. Acts as
    /// the nonce: exactly one authorization can exist per observed event.
    pub source_tx: TxHash,
    pub network: NetworkId,
}

impl SigningMessage {
    /// Authorization to mint wrapped balance for a confirmed deposit.
    pub fn mint(
        amount: Amount,
        recipient: &LedgerAddress,
        source_tx: TxHash,
        network: NetworkId,
    ) -> Self {
        Self {
            intent: Intent::Mint,
            amount,
            recipient: recipient.as_str().to_owned(),
            source_tx,
            network,
        }
    }

    /// Authorization to release coin for a confirmed burn.
    pub fn release(
        amount: Amount,
        destination: &CoinAddress,
        source_tx: TxHash,
        network: NetworkId,
    ) -> Self {
        Self {
            intent: Intent::Release,
            amount,
            recipient: destination.as_str().to_owned(),
            source_tx,
            network,
        }
    }

    /// The canonical byte encoding that is signed.
    ///
    /// Fixed field order, fixed-width integers big-endian, recipient
    /// length-prefixed. Any change here is a group-key-breaking protocol
    /// change.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let recipient = self.recipient.as_bytes();
        let mut out = Vec::with_capacity(DOMAIN_TAG.len() + 2 + 8 + 4 + recipient.len() + 32);
        out.extend_from_slice(DOMAIN_TAG);
        out.push(self.network.tag());
        out.push(self.intent.tag());
        out.extend_from_slice(&self.amount.atomic().to_be_bytes());
        out.extend_from_slice(&(recipient.len() as u32).to_be_bytes());
        out.extend_from_slice(recipient);
        out.extend_from_slice(self.source_tx.as_bytes());
        out
    }
}
