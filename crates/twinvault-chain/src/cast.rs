//! `KvClient` and `Signer` backed by Foundry's `cast`. Reads go through
//! `cast call`, writes through `cast send`, and message signing through
//! `cast wallet sign`. The private key is handed to the child process in
//! `ETH_PRIVATE_KEY`.

use crate::command::{CommandRunner, Output};
use crate::parse::{parse_address, parse_bool, parse_hex_bytes, parse_signature, to_hex_arg};
use log::{debug, warn};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use twinvault_core::config::TwinvaultConfig;
use twinvault_core::error::{TwinvaultError, TwinvaultResult};
use twinvault_core::keyfile::{key_to_hex, read_key_file, verify_checksum};
use twinvault_core::kv::{KvClient, Signer};
use zeroize::Zeroizing;

/// Default locations probed for a `cast` binary, after `~/.foundry/bin/cast`.
pub const DEFAULT_CAST_PATHS: &[&str] = &[
    "/usr/local/bin/cast",
    "/usr/bin/cast",
    "/opt/foundry/bin/cast",
];

const PRIVATE_KEY_ENV: &str = "ETH_PRIVATE_KEY";

const SIG_IS_AVAILABLE: &str = "isAvailable()(bool)";
const SIG_GET_DATA: &str = "getData(string)(bytes)";
const SIG_SET_DATA: &str = "setData(string,bytes)";

type Credential = Arc<Zeroizing<String>>;

/// Contract client that shells out to `cast`. Built read-only; attach a
/// key with [`CastKvClient::with_signing_key`] for writes.
#[derive(Clone)]
pub struct CastKvClient {
    runner: CommandRunner,
    contract: String,
    rpc_url: String,
    credential: Option<Credential>,
}

impl CastKvClient {
    /// Read-only client from the user configuration, discovering `cast` when needed.
    pub fn from_config(config: &TwinvaultConfig) -> TwinvaultResult<Self> {
        let timeout = config.contract_timeout();
        let runner = match config.cast_binary_path() {
            Some(path) => Self::runner_with_path(path, timeout)?,
            None => Self::discover(timeout)?,
        };
        Ok(Self {
            runner,
            contract: config.contract.address.clone(),
            rpc_url: config.contract.rpc_url.clone(),
            credential: None,
        })
    }

    /// Signing client: loads `wallet.key_hex_path` and checks its checksum.
    pub fn signing_from_config(config: &TwinvaultConfig) -> TwinvaultResult<Self> {
        let path = config.wallet_key_path().ok_or_else(|| {
            TwinvaultError::InvalidConfig(
                "wallet.key_hex_path is required for signing commands".to_string(),
            )
        })?;
        let key = read_key_file(&path)?;
        verify_checksum(&key, config.wallet.expected_sha256.as_deref())?;
        Ok(Self::from_config(config)?.with_signing_key(&key))
    }

    /// Client for an explicit `cast` binary.
    pub fn with_path(
        path: PathBuf,
        contract: impl Into<String>,
        rpc_url: impl Into<String>,
        timeout: Duration,
    ) -> TwinvaultResult<Self> {
        Ok(Self {
            runner: Self::runner_with_path(path, timeout)?,
            contract: contract.into(),
            rpc_url: rpc_url.into(),
            credential: None,
        })
    }

    /// Switch to signing mode with the given raw private key.
    pub fn with_signing_key(mut self, key: &[u8]) -> Self {
        self.credential = Some(Arc::new(key_to_hex(key)));
        self
    }

    pub fn is_signing(&self) -> bool {
        self.credential.is_some()
    }

    /// Wallet signer sharing this client's binary and key.
    pub fn signer(&self) -> TwinvaultResult<CastSigner> {
        let credential = self.credential.clone().ok_or_else(|| {
            TwinvaultError::InvalidConfig("no wallet key loaded; signer unavailable".to_string())
        })?;
        Ok(CastSigner {
            runner: self.runner.clone(),
            credential,
        })
    }

    fn runner_with_path(path: PathBuf, timeout: Duration) -> TwinvaultResult<CommandRunner> {
        if !path.exists() {
            return Err(TwinvaultError::InvalidConfig(format!(
                "cast binary not found at {}",
                path.display()
            )));
        }
        Ok(CommandRunner::new(path, timeout))
    }

    /// Walk the home Foundry install, then `DEFAULT_CAST_PATHS`.
    fn discover(timeout: Duration) -> TwinvaultResult<CommandRunner> {
        let home = env::var("HOME")
            .ok()
            .map(|home| Path::new(&home).join(".foundry").join("bin").join("cast"));
        let candidates = home
            .into_iter()
            .chain(DEFAULT_CAST_PATHS.iter().map(PathBuf::from));
        for candidate in candidates {
            if candidate.exists() {
                return Self::runner_with_path(candidate, timeout);
            }
        }
        Err(TwinvaultError::InvalidConfig(format!(
            "unable to locate cast binary; tried ~/.foundry/bin/cast and {:?}",
            DEFAULT_CAST_PATHS
        )))
    }

    /// `cast call` a view function and return its decoded output.
    fn call(&self, signature: &str, args: &[&str]) -> TwinvaultResult<Output> {
        let mut argv = vec!["call", self.contract.as_str(), signature];
        argv.extend_from_slice(args);
        argv.extend_from_slice(&["--rpc-url", self.rpc_url.as_str()]);
        let out = self.runner.run(&argv, &[])?;
        if out.status != 0 {
            return Err(TwinvaultError::Provider(format!(
                "{} call {} exited with code {}: {}",
                self.runner.binary().display(),
                signature,
                out.status,
                non_empty(out.diagnostic())
            )));
        }
        Ok(out)
    }

    /// Map a failed `cast send` into a transaction error with context.
    fn classify_send_error(output: &Output) -> TwinvaultError {
        let diagnostic = output.diagnostic();
        let lower = diagnostic.to_ascii_lowercase();
        if lower.contains("user rejected") || lower.contains("user denied") {
            return TwinvaultError::Transaction(format!("user rejected transaction: {diagnostic}"));
        }
        if lower.contains("revert") || lower.contains("(failed)") {
            return TwinvaultError::Transaction(format!("transaction reverted: {diagnostic}"));
        }
        TwinvaultError::Transaction(format!(
            "cast send exited with code {}: {}",
            output.status,
            non_empty(diagnostic)
        ))
    }
}

impl KvClient for CastKvClient {
    fn is_available(&self) -> bool {
        match self.call(SIG_IS_AVAILABLE, &[]) {
            Ok(out) => parse_bool(&out.stdout).unwrap_or_else(|| {
                warn!("unexpected isAvailable output: {}", out.stdout.trim());
                false
            }),
            Err(err) => {
                warn!("availability probe failed: {err}");
                false
            }
        }
    }

    fn get(&self, key: &str) -> TwinvaultResult<Vec<u8>> {
        let out = self.call(SIG_GET_DATA, &[key])?;
        parse_hex_bytes(&out.stdout).ok_or_else(|| TwinvaultError::Parse {
            key: key.to_string(),
            reason: format!("cast returned non-hex output `{}`", out.stdout.trim()),
        })
    }

    fn set(&self, key: &str, value: &[u8]) -> TwinvaultResult<()> {
        let credential = self.credential.as_ref().ok_or_else(|| {
            TwinvaultError::Transaction("client is read-only; no wallet key loaded".to_string())
        })?;
        let payload = to_hex_arg(value);
        let argv = [
            "send",
            self.contract.as_str(),
            SIG_SET_DATA,
            key,
            payload.as_str(),
            "--rpc-url",
            self.rpc_url.as_str(),
        ];
        let out = self
            .runner
            .run(&argv, &[(PRIVATE_KEY_ENV, credential.as_str())])
            .map_err(|err| TwinvaultError::Transaction(err.to_string()))?;
        if out.status != 0 || out.stdout.contains("(failed)") {
            return Err(Self::classify_send_error(&out));
        }
        debug!("setData({key}) confirmed ({} bytes)", value.len());
        Ok(())
    }

    fn contract_address(&self) -> TwinvaultResult<String> {
        Ok(self.contract.clone())
    }
}

/// Message signer backed by `cast wallet`.
#[derive(Clone)]
pub struct CastSigner {
    runner: CommandRunner,
    credential: Credential,
}

impl CastSigner {
    fn run_wallet(&self, args: &[&str]) -> TwinvaultResult<Output> {
        let mut argv = vec!["wallet"];
        argv.extend_from_slice(args);
        self.runner
            .run(&argv, &[(PRIVATE_KEY_ENV, self.credential.as_str())])
    }
}

impl Signer for CastSigner {
    fn address(&self) -> TwinvaultResult<String> {
        let out = self.run_wallet(&["address"])?;
        if out.status != 0 {
            return Err(TwinvaultError::Provider(format!(
                "cast wallet address failed: {}",
                non_empty(out.diagnostic())
            )));
        }
        parse_address(&out.stdout).ok_or_else(|| {
            TwinvaultError::Provider(format!(
                "cast wallet address printed `{}`",
                out.stdout.trim()
            ))
        })
    }

    fn sign_message(&self, message: &str) -> TwinvaultResult<String> {
        let out = self.run_wallet(&["sign", message])?;
        if out.status != 0 {
            return Err(TwinvaultError::Signature(non_empty(out.diagnostic()).to_string()));
        }
        parse_signature(&out.stdout).ok_or_else(|| {
            TwinvaultError::Signature(format!("cast wallet sign printed `{}`", out.stdout.trim()))
        })
    }
}

fn non_empty(text: &str) -> &str {
    if text.is_empty() {
        "no additional output"
    } else {
        text
    }
}
