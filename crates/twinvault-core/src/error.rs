use std::path::PathBuf;
use thiserror::Error;

/// Result alias for core operations.
pub type TwinvaultResult<T> = Result<T, TwinvaultError>;

#[derive(Error, Debug)]
pub enum TwinvaultError {
    #[error("[TV1000] io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("[TV1001] toml config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("[TV1002] yaml config parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("[TV1003] json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("[TV1100] configuration error: {0}")]
    InvalidConfig(String),

    #[error("[TV1300] failed to decode wallet key at {path}: {reason}")]
    InvalidHexKey { path: PathBuf, reason: String },

    #[error("[TV2000] contract is not available")]
    Unavailable,

    #[error("[TV2001] stored value under `{key}` could not be parsed: {reason}")]
    Parse { key: String, reason: String },

    #[error("[TV2100] transaction failed: {0}")]
    Transaction(String),

    #[error("[TV2200] twin `{0}` not found")]
    NotFound(String),

    #[error("[TV2300] address {caller} is not the owner of twin `{id}`")]
    Unauthorized { id: String, caller: String },

    #[error("[TV2400] twin index update lost the race {attempts} times; giving up")]
    IndexConflict { attempts: u32 },

    #[error("[TV2500] interest `{category}` must be within 0..=100 (got {value})")]
    InvalidInterest { category: String, value: i64 },

    #[error("[TV2600] signature rejected: {0}")]
    Signature(String),

    #[error("[TV3000] provider error: {0}")]
    Provider(String),
}

impl TwinvaultError {
    pub fn code(&self) -> &'static str {
        match self {
            TwinvaultError::Io(_) => "TV1000",
            TwinvaultError::Toml(_) => "TV1001",
            TwinvaultError::Yaml(_) => "TV1002",
            TwinvaultError::Json(_) => "TV1003",
            TwinvaultError::InvalidConfig(_) => "TV1100",
            TwinvaultError::InvalidHexKey { .. } => "TV1300",
            TwinvaultError::Unavailable => "TV2000",
            TwinvaultError::Parse { .. } => "TV2001",
            TwinvaultError::Transaction(_) => "TV2100",
            TwinvaultError::NotFound(_) => "TV2200",
            TwinvaultError::Unauthorized { .. } => "TV2300",
            TwinvaultError::IndexConflict { .. } => "TV2400",
            TwinvaultError::InvalidInterest { .. } => "TV2500",
            TwinvaultError::Signature(_) => "TV2600",
            TwinvaultError::Provider(_) => "TV3000",
        }
    }

    /// True when the error came from the signer refusing to sign, as opposed
    /// to a network or contract failure.
    pub fn is_user_rejection(&self) -> bool {
        match self {
            TwinvaultError::Transaction(msg) | TwinvaultError::Signature(msg) => {
                let lower = msg.to_ascii_lowercase();
                lower.contains("user rejected") || lower.contains("user denied")
            }
            _ => false,
        }
    }
}
