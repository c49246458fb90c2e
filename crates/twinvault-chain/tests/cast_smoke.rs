use sha2::{Digest, Sha256};
use std::env;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tempfile::{tempdir, TempDir};
use twinvault_chain::CastKvClient;
use twinvault_core::config::{
    ConfigFormat, ContractCfg, DecryptCfg, RetryCfg, TwinvaultConfig, WalletCfg,
};
use twinvault_core::{
    AuthProof, InterestCategory, InterestProfile, KvClient, Signer, TwinRepository, TwinStatus,
    TwinvaultError, TwinvaultResult,
};

const CONTRACT: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";
const WALLET: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

const FAKE_CAST_SCRIPT: &str = r#"#!/usr/bin/env python3
import json
import os
import sys

STATE = os.environ.get("FAKE_CAST_STATE")
if not STATE:
    print("FAKE_CAST_STATE not set", file=sys.stderr)
    sys.exit(3)

try:
    with open(STATE, "r", encoding="utf-8") as fh:
        state = json.load(fh)
except (FileNotFoundError, json.JSONDecodeError):
    state = {}

state.setdefault("available", True)
state.setdefault("data", {})

def save():
    with open(STATE, "w", encoding="utf-8") as fh:
        json.dump(state, fh)

def require_key():
    if not os.environ.get("ETH_PRIVATE_KEY"):
        print("Error: no signer configured", file=sys.stderr)
        sys.exit(1)

args = sys.argv[1:]
if not args:
    sys.exit(2)

if args[0] == "call" and len(args) >= 5 and args[-2] == "--rpc-url":
    if args[2] == "isAvailable()(bool)":
        print("true" if state["available"] else "false")
        sys.exit(0)
    if args[2] == "getData(string)(bytes)" and len(args) == 6:
        print(state["data"].get(args[3], "0x"))
        sys.exit(0)

if args[0] == "send" and len(args) == 7 and args[2] == "setData(string,bytes)":
    require_key()
    if os.environ.get("FAKE_CAST_REJECT"):
        print("Error: user rejected transaction", file=sys.stderr)
        sys.exit(1)
    state["data"][args[3]] = args[4]
    save()
    print("status               1 (success)")
    sys.exit(0)

if args[0] == "wallet" and len(args) >= 2:
    require_key()
    if args[1] == "address":
        print("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266")
        sys.exit(0)
    if args[1] == "sign" and len(args) == 3:
        print("0x" + "ab" * 65)
        sys.exit(0)

print("unexpected args: " + " ".join(args), file=sys.stderr)
sys.exit(2)
"#;

struct Harness {
    state_path: PathBuf,
    config: Arc<TwinvaultConfig>,
    _state_guard: EnvGuard,
    _tmp: TempDir,
    _lock: MutexGuard<'static, ()>,
}

impl Harness {
    fn new(state: &str) -> TwinvaultResult<Self> {
        let lock = test_lock().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let tmp = tempdir()?;

        let cast_path = tmp.path().join("cast.py");
        fs::write(&cast_path, FAKE_CAST_SCRIPT)?;
        make_executable(&cast_path)?;

        let state_path = tmp.path().join("state.json");
        fs::write(&state_path, state)?;
        let state_guard = EnvGuard::set("FAKE_CAST_STATE", state_path.to_string_lossy());

        let key_path = tmp.path().join("wallet.hex");
        let raw_key: Vec<u8> = (1..=32u8).collect();
        fs::write(&key_path, format!("0x{}\n", hex::encode(&raw_key)))?;

        let config = Arc::new(TwinvaultConfig {
            contract: ContractCfg {
                address: CONTRACT.to_string(),
                rpc_url: "http://127.0.0.1:8545".to_string(),
                chain_id: 31_337,
                cast_path: Some(cast_path.to_string_lossy().into_owned()),
                timeout_secs: 10,
            },
            wallet: WalletCfg {
                key_hex_path: Some(key_path.to_string_lossy().into_owned()),
                expected_sha256: Some(hex::encode(Sha256::digest(&raw_key))),
            },
            decrypt: DecryptCfg {
                duration_days: 30,
                confirm_delay_ms: 0,
            },
            retry: RetryCfg {
                max_attempts: 3,
                base_delay_ms: 1,
                max_delay_ms: 2,
                jitter_ratio: 0.0,
            },
            path: PathBuf::from("/etc/twinvault.toml"),
            format: ConfigFormat::Toml,
        });

        Ok(Self {
            state_path,
            config,
            _state_guard: state_guard,
            _tmp: tmp,
            _lock: lock,
        })
    }

    fn stored_keys(&self) -> Vec<String> {
        let raw = fs::read_to_string(&self.state_path).unwrap();
        let state: serde_json::Value = serde_json::from_str(&raw).unwrap();
        state["data"]
            .as_object()
            .map(|data| data.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[test]
fn cast_smoke_creates_lists_and_toggles() -> TwinvaultResult<()> {
    let harness = Harness::new(r#"{"available":true,"data":{}}"#)?;

    let client = CastKvClient::signing_from_config(&harness.config)?;
    let signer = client.signer()?;
    let owner = signer.address()?;
    assert_eq!(owner, WALLET);

    let repo = TwinRepository::new(harness.config.clone(), client);
    let mut profile = InterestProfile::default();
    profile.set(InterestCategory::Technology, 90)?;
    let created = repo.create(&owner, &profile)?;
    assert_eq!(created.status, TwinStatus::Active);
    assert_eq!(created.earnings, "0");

    let mut keys = harness.stored_keys();
    keys.sort();
    assert_eq!(keys, vec![format!("twin_{}", created.id), "twin_keys".to_string()]);

    let readonly = TwinRepository::new(
        harness.config.clone(),
        CastKvClient::from_config(&harness.config)?,
    );
    let listed = readonly.list();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, created.id);
    assert!(listed[0].encoded_interests.contains("FHE-"));

    let toggled = repo.toggle_status(&created.id, &owner)?;
    assert_eq!(toggled.status, TwinStatus::Inactive);
    assert_eq!(readonly.get(&created.id)?.status, TwinStatus::Inactive);
    Ok(())
}

#[test]
fn cast_smoke_read_only_client_cannot_write() -> TwinvaultResult<()> {
    let harness = Harness::new(r#"{"available":true,"data":{}}"#)?;
    let client = CastKvClient::from_config(&harness.config)?;
    assert!(!client.is_signing());

    let err = client.set("twin_keys", b"[]").unwrap_err();
    assert!(matches!(err, TwinvaultError::Transaction(_)));
    assert!(client.signer().is_err());
    assert!(harness.stored_keys().is_empty());
    Ok(())
}

#[test]
fn cast_smoke_unavailable_contract_degrades() -> TwinvaultResult<()> {
    let harness = Harness::new(r#"{"available":false,"data":{}}"#)?;
    let repo = TwinRepository::new(
        harness.config.clone(),
        CastKvClient::signing_from_config(&harness.config)?,
    );

    assert!(repo.list().is_empty());
    let err = repo
        .create(WALLET, &InterestProfile::default())
        .unwrap_err();
    assert!(matches!(err, TwinvaultError::Unavailable));
    assert!(harness.stored_keys().is_empty());
    Ok(())
}

#[test]
fn cast_smoke_surfaces_rejection() -> TwinvaultResult<()> {
    let harness = Harness::new(r#"{"available":true,"data":{}}"#)?;
    let _reject = EnvGuard::set("FAKE_CAST_REJECT", "1");
    let repo = TwinRepository::new(
        harness.config.clone(),
        CastKvClient::signing_from_config(&harness.config)?,
    );

    let err = repo
        .create(WALLET, &InterestProfile::default())
        .unwrap_err();
    assert!(err.is_user_rejection(), "{err}");
    assert!(repo.list().is_empty());
    Ok(())
}

#[test]
fn cast_smoke_decrypts_after_signing() -> TwinvaultResult<()> {
    let harness = Harness::new(r#"{"available":true,"data":{}}"#)?;
    let client = CastKvClient::signing_from_config(&harness.config)?;
    let signer = client.signer()?;
    let repo = TwinRepository::new(harness.config.clone(), client);

    let mut profile = InterestProfile::default();
    profile.set(InterestCategory::Sports, 20)?;
    let created = repo.create(WALLET, &profile)?;

    let challenge = repo.challenge()?;
    assert_eq!(challenge.contract_address, CONTRACT);
    assert_eq!(challenge.chain_id, 31_337);

    let proof = AuthProof::sign(&signer, &challenge)?;
    let decrypted = repo.decrypt_interests(&created.encoded_interests, &proof, &challenge)?;
    assert_eq!(decrypted.len(), InterestCategory::ALL.len());
    assert_eq!(decrypted["sports"], 20.0);
    assert_eq!(decrypted["entertainment"], 50.0);
    Ok(())
}

#[test]
fn cast_smoke_rejects_wrong_key_checksum() -> TwinvaultResult<()> {
    let harness = Harness::new(r#"{"available":true,"data":{}}"#)?;
    let mut config = (*harness.config).clone();
    config.wallet.expected_sha256 = Some("00".repeat(32));

    assert!(CastKvClient::signing_from_config(&config).is_err());
    Ok(())
}

fn test_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

struct EnvGuard {
    key: &'static str,
    prev: Option<String>,
}

impl EnvGuard {
    fn set<K: Into<String>>(key: &'static str, value: K) -> Self {
        let prev = env::var(key).ok();
        let value = value.into();
        env::set_var(key, &value);
        Self { key, prev }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        if let Some(prev) = &self.prev {
            env::set_var(self.key, prev);
        } else {
            env::remove_var(self.key);
        }
    }
}

fn make_executable(path: &Path) -> std::io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms)
}
