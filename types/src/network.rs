//! Network identifier.

use serde::{Deserialize, Serialize};

/// Identifies which deployment a bridge operator belongs to.
///
/// Mixed into every transport envelope and signing message, so operators
/// and signatures from different deployments can never be replayed across
/// networks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkId {
    /// The production bridge.
    Main,
    /// The public staging bridge (testnet coins).
    Stage,
    /// Local development.
    Dev,
}

impl NetworkId {
    /// Default operator transport port for this network.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Main => 9040,
            Self::Stage => 19040,
            Self::Dev => 29040,
        }
    }

    /// Human-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Stage => "stage",
            Self::Dev => "dev",
        }
    }

    /// Single-byte tag used in canonical encodings.
    pub fn tag(&self) -> u8 {
        match self {
            Self::Main => 0,
            Self::Stage => 1,
            Self::Dev => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_distinct() {
        assert_ne!(NetworkId::Main.tag(), NetworkId::Stage.tag());
        assert_ne!(NetworkId::Stage.tag(), NetworkId::Dev.tag());
    }
}
