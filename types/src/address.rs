//! Chain address types.
//!
//! Both chains' address formats are opaque to the bridge core: the coin
//! chain's deposit subaddresses and the host ledger's account addresses are
//! produced and validated by the external RPC collaborators. The bridge
//! only stores, compares, and routes them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An address on the coin chain (a derived deposit subaddress or a
/// withdrawal destination).
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct CoinAddress(String);

impl CoinAddress {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CoinAddress {
    /// At most the first 12 characters; `{:#}` for the full address.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() || self.0.len() <= 12 {
            write!(f, "{}", self.0)
        } else {
            write!(f, "{}…", &self.0[..12])
        }
    }
}

/// An address on the host ledger. Doubles as the user identity the bridge
/// maps deposit addresses to.
#[derive(Clone, PartialEq, Eq, Hash, Debug, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LedgerAddress(String);

impl LedgerAddress {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LedgerAddress {
    /// At most the first 12 characters; `{:#}` for the full address.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() || self.0.len() <= 12 {
            write!(f, "{}", self.0)
        } else {
            write!(f, "{}…", &self.0[..12])
        }
    }
}
