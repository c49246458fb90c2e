use crate::error::{TwinvaultError, TwinvaultResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/twinvault.toml";

/// Sepolia, where the twin contract is usually deployed.
const DEFAULT_CHAIN_ID: u64 = 11_155_111;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ContractCfg {
    /// Address of the key/value contract (`0x` followed by 40 hex digits).
    pub address: String,

    /// JSON-RPC endpoint handed to the contract tooling.
    pub rpc_url: String,

    #[serde(default = "default_chain_id")]
    pub chain_id: u64,

    /// Explicit path to the `cast` binary; discovered when omitted.
    #[serde(default)]
    pub cast_path: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_chain_id() -> u64 {
    DEFAULT_CHAIN_ID
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct WalletCfg {
    /// Private key used for signing mode. Read-only commands work without it.
    #[serde(default)]
    pub key_hex_path: Option<String>,

    #[serde(default)]
    pub expected_sha256: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DecryptCfg {
    #[serde(default = "default_duration_days")]
    pub duration_days: u32,

    #[serde(default = "default_confirm_delay_ms")]
    pub confirm_delay_ms: u64,
}

fn default_duration_days() -> u32 {
    30
}

fn default_confirm_delay_ms() -> u64 {
    1500
}

impl Default for DecryptCfg {
    fn default() -> Self {
        Self {
            duration_days: default_duration_days(),
            confirm_delay_ms: default_confirm_delay_ms(),
        }
    }
}

/// Backoff policy for the conditional index update.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RetryCfg {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    200
}

fn default_max_delay_ms() -> u64 {
    3000
}

fn default_jitter_ratio() -> f64 {
    0.2
}

impl Default for RetryCfg {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ratio: default_jitter_ratio(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigFormat {
    #[default]
    Toml,
    Yaml,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TwinvaultConfig {
    pub contract: ContractCfg,

    #[serde(default)]
    pub wallet: WalletCfg,

    #[serde(default)]
    pub decrypt: DecryptCfg,

    #[serde(default)]
    pub retry: RetryCfg,

    #[serde(skip)]
    #[schemars(skip)]
    pub path: PathBuf,

    #[serde(skip)]
    #[schemars(skip)]
    pub format: ConfigFormat,
}

impl TwinvaultConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> TwinvaultResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let format = if matches!(path.extension().and_then(|ext| ext.to_str()), Some(ext) if ext.eq_ignore_ascii_case("toml"))
        {
            ConfigFormat::Toml
        } else {
            ConfigFormat::Yaml
        };
        let mut cfg = match format {
            ConfigFormat::Toml => toml::from_str::<Self>(&contents)?,
            ConfigFormat::Yaml => serde_yaml::from_str::<Self>(&contents)?,
        };

        cfg.path = path.to_path_buf();
        cfg.format = format;

        if cfg.contract.address.trim().is_empty() {
            return Err(TwinvaultError::InvalidConfig(
                "contract.address must be set".to_string(),
            ));
        }

        Ok(cfg)
    }

    /// Collect every problem with the configuration instead of stopping at the first.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if !looks_like_address(&self.contract.address) {
            issues.push(format!(
                "contract.address `{}` is not a 0x-prefixed 20-byte hex address",
                self.contract.address
            ));
        }
        if self.contract.rpc_url.trim().is_empty() {
            issues.push("contract.rpc_url must not be empty".to_string());
        }
        if self.contract.timeout_secs == 0 {
            issues.push("contract.timeout_secs must be greater than zero".to_string());
        }
        if let Some(path) = &self.contract.cast_path {
            if !Path::new(path).exists() {
                issues.push(format!("contract.cast_path {} does not exist", path));
            }
        }
        if let Some(sha) = &self.wallet.expected_sha256 {
            if sha.len() != 64 || !sha.chars().all(|c| c.is_ascii_hexdigit()) {
                issues.push("wallet.expected_sha256 must be 64 hex digits".to_string());
            }
        }
        if self.decrypt.duration_days == 0 {
            issues.push("decrypt.duration_days must be greater than zero".to_string());
        }
        if self.retry.max_attempts == 0 {
            issues.push("retry.max_attempts must be at least 1".to_string());
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            issues.push("retry.max_delay_ms must not be below retry.base_delay_ms".to_string());
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_ratio) {
            issues.push("retry.jitter_ratio must be within 0.0..=1.0".to_string());
        }

        issues
    }

    pub fn wallet_key_path(&self) -> Option<PathBuf> {
        self.wallet.key_hex_path.as_ref().map(PathBuf::from)
    }

    pub fn contract_timeout(&self) -> Duration {
        Duration::from_secs(self.contract.timeout_secs)
    }

    pub fn confirm_delay(&self) -> Duration {
        Duration::from_millis(self.decrypt.confirm_delay_ms)
    }

    pub fn cast_binary_path(&self) -> Option<PathBuf> {
        self.contract.cast_path.as_ref().map(PathBuf::from)
    }
}

/// Loose check for an EVM address; casing is not verified.
pub fn looks_like_address(value: &str) -> bool {
    let Some(hex) = value.strip_prefix("0x") else {
        return false;
    };
    hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const MINIMAL_TOML: &str = r#"
[contract]
address = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
rpc_url = "http://127.0.0.1:8545"
"#;

    #[test]
    fn load_toml_applies_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("twinvault.toml");
        fs::write(&path, MINIMAL_TOML).unwrap();

        let cfg = TwinvaultConfig::load(&path).unwrap();
        assert_eq!(cfg.format, ConfigFormat::Toml);
        assert_eq!(cfg.contract.chain_id, DEFAULT_CHAIN_ID);
        assert_eq!(cfg.decrypt.duration_days, 30);
        assert_eq!(cfg.confirm_delay(), Duration::from_millis(1500));
        assert_eq!(cfg.retry.max_attempts, 5);
        assert!(cfg.wallet_key_path().is_none());
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn load_yaml_by_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("twinvault.yaml");
        fs::write(
            &path,
            "contract:\n  address: \"0x5FbDB2315678afecb367f032d93F642f64180aa3\"\n  rpc_url: http://localhost:8545\n  chain_id: 31337\nwallet:\n  key_hex_path: /tmp/key.hex\n",
        )
        .unwrap();

        let cfg = TwinvaultConfig::load(&path).unwrap();
        assert_eq!(cfg.format, ConfigFormat::Yaml);
        assert_eq!(cfg.contract.chain_id, 31337);
        assert_eq!(cfg.wallet_key_path(), Some(PathBuf::from("/tmp/key.hex")));
    }

    #[test]
    fn load_rejects_blank_address() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("twinvault.toml");
        fs::write(&path, "[contract]\naddress = \"\"\nrpc_url = \"http://x\"\n").unwrap();

        let err = TwinvaultConfig::load(&path).unwrap_err();
        assert!(matches!(err, TwinvaultError::InvalidConfig(_)));
    }

    #[test]
    fn validate_reports_every_issue() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("twinvault.toml");
        fs::write(
            &path,
            "[contract]\naddress = \"0x1234\"\nrpc_url = \"\"\ntimeout_secs = 0\n\n[retry]\nmax_attempts = 0\njitter_ratio = 2.0\n",
        )
        .unwrap();

        let cfg = TwinvaultConfig::load(&path).unwrap();
        let issues = cfg.validate();
        assert_eq!(issues.len(), 5, "{issues:?}");
    }

    #[test]
    fn looks_like_address_checks_shape() {
        assert!(looks_like_address("0x5FbDB2315678afecb367f032d93F642f64180aa3"));
        assert!(!looks_like_address("5FbDB2315678afecb367f032d93F642f64180aa3"));
        assert!(!looks_like_address("0xZZbDB2315678afecb367f032d93F642f64180aa3"));
    }
}
