//! Operator configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use aqueduct_network::{OperatorDirectory, OperatorEntry};
use aqueduct_types::{NetworkId, ParticipantId, PublicKey};

use crate::BridgeError;

/// Configuration for one bridge operator.
///
/// Loaded from a TOML file via [`BridgeConfig::from_toml_file`] or built
/// programmatically (e.g. for tests). The roster is the out-of-band
/// agreement between operators; every operator ships the same roster.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Which deployment this operator belongs to.
    #[serde(default = "default_network")]
    pub network: NetworkId,

    /// Data directory for the LMDB store and the operator share file.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// This operator's index in the roster.
    pub participant_index: u16,

    /// Signers required per authorization (T of N).
    pub threshold: u16,

    /// BIP39 phrase the operator identity key is derived from. Optional
    /// on dev networks, where a throwaway key is generated instead.
    #[serde(default)]
    pub operator_mnemonic: String,

    /// Confirmations required before a deposit or burn is acted on.
    #[serde(default = "default_min_confirmations")]
    pub min_confirmations: u64,

    /// Seconds between chain poll cycles.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Seconds a signing session may run before it is aborted.
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,

    /// Seconds each DKG round may take before silent peers are excluded.
    #[serde(default = "default_dkg_round_timeout_secs")]
    pub dkg_round_timeout_secs: u64,

    /// Wallet account deposit subaddresses are derived under.
    #[serde(default)]
    pub account: u32,

    /// The full operator roster, including this operator.
    pub roster: Vec<RosterEntry>,
}

/// One roster line: who, where, and which key signs their envelopes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RosterEntry {
    pub index: u16,
    pub endpoint: String,
    /// Hex-encoded Ed25519 identity public key.
    pub identity_key: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_network() -> NetworkId {
    NetworkId::Dev
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./aqueduct_data")
}

fn default_min_confirmations() -> u64 {
    10
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_session_timeout_secs() -> u64 {
    60
}

fn default_dkg_round_timeout_secs() -> u64 {
    120
}

impl BridgeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self, BridgeError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = toml::from_str(&contents).map_err(|e| {
            BridgeError::Configuration(format!("cannot parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Fatal startup checks.
    pub fn validate(&self) -> Result<(), BridgeError> {
        let n = self.roster.len() as u16;
        if n == 0 {
            return Err(BridgeError::Configuration("roster is empty".into()));
        }
        if self.threshold == 0 || self.threshold > n {
            return Err(BridgeError::Configuration(format!(
                "threshold {} is invalid for a roster of {n}",
                self.threshold
            )));
        }
        if n > 1 && self.threshold < 2 {
            return Err(BridgeError::Configuration(
                "multi-operator deployments need a threshold of at least 2".into(),
            ));
        }
        if self.min_confirmations == 0 {
            return Err(BridgeError::Configuration(
                "min_confirmations must be at least 1".into(),
            ));
        }
        if !self.roster.iter().any(|r| r.index == self.participant_index) {
            return Err(BridgeError::Configuration(format!(
                "participant_index {} is not in the roster",
                self.participant_index
            )));
        }
        if self.network != NetworkId::Dev && self.operator_mnemonic.is_empty() {
            return Err(BridgeError::Configuration(
                "operator_mnemonic is required outside dev".into(),
            ));
        }
        for entry in &self.roster {
            parse_identity_key(&entry.identity_key)?;
        }
        Ok(())
    }

    pub fn participant_id(&self) -> Result<ParticipantId, BridgeError> {
        ParticipantId::new(self.participant_index)
            .ok_or_else(|| BridgeError::Configuration("participant_index must be nonzero".into()))
    }

    /// Build the transport directory from the roster.
    pub fn directory(&self) -> Result<OperatorDirectory, BridgeError> {
        let local = self.participant_id()?;
        let mut entries = Vec::with_capacity(self.roster.len());
        for r in &self.roster {
            let id = ParticipantId::new(r.index).ok_or_else(|| {
                BridgeError::Configuration("roster index must be nonzero".into())
            })?;
            entries.push(OperatorEntry {
                id,
                endpoint: r.endpoint.clone(),
                identity_key: parse_identity_key(&r.identity_key)?,
            });
        }
        OperatorDirectory::new(local, entries)
            .map_err(|e| BridgeError::Configuration(e.to_string()))
    }

    /// Path of the persisted operator share.
    pub fn share_path(&self) -> PathBuf {
        self.data_dir.join("operator_share.key")
    }
}

fn parse_identity_key(hex_key: &str) -> Result<PublicKey, BridgeError> {
    let bytes = hex::decode(hex_key)
        .map_err(|e| BridgeError::Configuration(format!("bad identity key hex: {e}")))?;
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| BridgeError::Configuration("identity key must be 32 bytes".into()))?;
    Ok(PublicKey(arr))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster_entry(index: u16) -> RosterEntry {
        RosterEntry {
            index,
            endpoint: format!("127.0.0.1:{}", 9000 + index),
            identity_key: "aa".repeat(32),
        }
    }

    fn base_config() -> BridgeConfig {
        BridgeConfig {
            network: NetworkId::Dev,
            data_dir: PathBuf::from("/tmp/aqueduct-test"),
            participant_index: 1,
            threshold: 2,
            operator_mnemonic: String::new(),
            min_confirmations: 10,
            poll_interval_secs: 60,
            session_timeout_secs: 60,
            dkg_round_timeout_secs: 120,
            account: 0,
            roster: vec![roster_entry(1), roster_entry(2), roster_entry(3)],
        }
    }

    #[test]
    fn valid_config_passes() {
        base_config().validate().unwrap();
    }

    #[test]
    fn threshold_above_roster_fails() {
        let mut config = base_config();
        config.threshold = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn threshold_one_with_peers_fails() {
        let mut config = base_config();
        config.threshold = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn solo_threshold_one_is_fine() {
        let mut config = base_config();
        config.roster = vec![roster_entry(1)];
        config.threshold = 1;
        config.validate().unwrap();
    }

    #[test]
    fn missing_self_in_roster_fails() {
        let mut config = base_config();
        config.participant_index = 9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn mnemonic_required_outside_dev() {
        let mut config = base_config();
        config.network = NetworkId::Main;
        assert!(config.validate().is_err());
        config.operator_mnemonic = "word ".repeat(24).trim_end().to_string();
        config.validate().unwrap();
    }

    #[test]
    fn zero_confirmations_fails() {
        let mut config = base_config();
        config.min_confirmations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_roundtrip_with_defaults() {
        let toml_src = r#"
            participant_index = 2
            threshold = 2

            [[roster]]
            index = 1
            endpoint = "10.0.0.1:9040"
            identity_key = "1111111111111111111111111111111111111111111111111111111111111111"
        "#;
        let config: BridgeConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(config.min_confirmations, 10);
        assert_eq!(config.poll_interval_secs, 60);
        // Parse succeeds; validation still rejects it (threshold 2 with a
        // one-entry roster, self missing from the roster).
        assert!(config.validate().is_err());
    }
}
