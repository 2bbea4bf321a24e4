use std::{collections::BTreeMap, fs, path::Path, str::FromStr};

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Address of the AskMi factory contract.
pub const PROVIDER_ADDRESS_VAR: &str = "ASKMI_PROVIDER_ADDRESS";
/// Chain the dapp is deployed on, decimal or 0x-hex.
pub const CHAIN_ID_VAR: &str = "ASKMI_CHAIN_ID";

#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("missing configuration key {key}")]
    Missing { key: &'static str },
    #[error("invalid address {value:?} for {key}")]
    InvalidAddress { key: &'static str, value: String },
    #[error("invalid chain id {value:?}")]
    InvalidChainId { value: String },
    #[error("provider address must not be the zero address")]
    ZeroAddress,
    #[error("chain id must be non-zero")]
    ZeroChainId,
    #[error("reading configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Validated application configuration, built once at startup and passed to
/// whatever needs it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    pub provider_address: Address,
    pub chain_id: u64,
}

impl AppConfig {
    pub fn new(provider_address: Address, chain_id: u64) -> Result<Self, ConfigurationError> {
        let config = Self {
            provider_address,
            chain_id,
        };
        config.validate()?;
        Ok(config)
    }

    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_vars(std::env::vars())
    }

    /// Read the configuration from explicit key/value pairs.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: BTreeMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let lookup = |key: &'static str| {
            vars.get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigurationError::Missing { key })
        };

        let raw_address = lookup(PROVIDER_ADDRESS_VAR)?;
        let provider_address =
            Address::from_str(raw_address).map_err(|_| ConfigurationError::InvalidAddress {
                key: PROVIDER_ADDRESS_VAR,
                value: raw_address.to_string(),
            })?;
        let chain_id = parse_chain_id(lookup(CHAIN_ID_VAR)?)?;

        debug!(%provider_address, chain_id, "configuration read from environment");
        Self::new(provider_address, chain_id)
    }

    /// Read the configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let bytes = fs::read(path)?;
        let config: Self = serde_json::from_slice(&bytes)?;
        config.validate()?;
        debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.provider_address == Address::ZERO {
            return Err(ConfigurationError::ZeroAddress);
        }
        if self.chain_id == 0 {
            return Err(ConfigurationError::ZeroChainId);
        }
        Ok(())
    }
}

/// Wallets report chain ids as 0x-hex, deployment scripts as decimal.
pub fn parse_chain_id(value: &str) -> Result<u64, ConfigurationError> {
    let value = value.trim();
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex_digits) => u64::from_str_radix(hex_digits, 16),
        None => value.parse::<u64>(),
    };
    parsed.map_err(|_| ConfigurationError::InvalidChainId {
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FACTORY: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

    #[test]
    fn reads_required_keys() {
        let config = AppConfig::from_vars([
            (PROVIDER_ADDRESS_VAR, FACTORY),
            (CHAIN_ID_VAR, "31337"),
            ("UNRELATED", "x"),
        ])
        .expect("config");
        assert_eq!(config.chain_id, 31337);
        assert_eq!(config.provider_address, Address::from_str(FACTORY).unwrap());
    }

    #[test]
    fn accepts_hex_chain_id() {
        assert_eq!(parse_chain_id("0x7a69").unwrap(), 31337);
        assert_eq!(parse_chain_id(" 43114 ").unwrap(), 43114);
        assert!(matches!(
            parse_chain_id("mainnet"),
            Err(ConfigurationError::InvalidChainId { .. })
        ));
    }

    #[test]
    fn missing_key_is_an_error() {
        let err = AppConfig::from_vars([(CHAIN_ID_VAR, "1")]).unwrap_err();
        match err {
            ConfigurationError::Missing { key } => assert_eq!(key, PROVIDER_ADDRESS_VAR),
            other => panic!("unexpected error {other}"),
        }

        let err = AppConfig::from_vars([(PROVIDER_ADDRESS_VAR, FACTORY), (CHAIN_ID_VAR, "  ")])
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::Missing { key: CHAIN_ID_VAR }));
    }

    #[test]
    fn rejects_bad_values() {
        let err = AppConfig::from_vars([(PROVIDER_ADDRESS_VAR, "0x1234"), (CHAIN_ID_VAR, "1")])
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidAddress { .. }));

        let err = AppConfig::from_vars([(PROVIDER_ADDRESS_VAR, FACTORY), (CHAIN_ID_VAR, "0")])
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::ZeroChainId));

        assert!(matches!(
            AppConfig::new(Address::ZERO, 1),
            Err(ConfigurationError::ZeroAddress)
        ));
    }

    #[test]
    fn loads_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("askmi.json");
        fs::write(
            &path,
            format!(r#"{{"provider_address":"{FACTORY}","chain_id":43113}}"#),
        )
        .unwrap();
        let config = AppConfig::load(&path).expect("load");
        assert_eq!(config.chain_id, 43113);

        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            AppConfig::load(&path),
            Err(ConfigurationError::Parse(_))
        ));
        assert!(matches!(
            AppConfig::load(&dir.path().join("missing.json")),
            Err(ConfigurationError::Io(_))
        ));
    }
}
