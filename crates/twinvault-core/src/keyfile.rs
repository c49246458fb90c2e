//! Wallet key parsing and persistence helpers shared by the CLI and the chain adapter.

use crate::error::{TwinvaultError, TwinvaultResult};
use hex::FromHex;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

/// Length of a secp256k1 private key.
pub const KEY_LEN: usize = 32;

/// Read bytes from `path` and decode them into a raw private key.
pub fn read_key_file(path: &Path) -> TwinvaultResult<Zeroizing<Vec<u8>>> {
    let contents = Zeroizing::new(fs::read(path)?);
    decode_key_bytes(path, &contents)
}

/// Decode raw bytes into key material, accepting either a 32-byte binary key
/// or 64 hex digits with an optional `0x` prefix (whitespace ignored).
pub fn decode_key_bytes(origin: &Path, bytes: &[u8]) -> TwinvaultResult<Zeroizing<Vec<u8>>> {
    if bytes.len() == KEY_LEN {
        return Ok(Zeroizing::new(bytes.to_vec()));
    }

    let mut filtered = Zeroizing::new(Vec::with_capacity(bytes.len()));
    for byte in bytes {
        if !byte.is_ascii_whitespace() {
            filtered.push(*byte);
        }
    }

    if filtered.is_empty() {
        return Err(invalid_key(origin, "file is empty"));
    }

    let digits: &[u8] = if filtered.starts_with(b"0x") || filtered.starts_with(b"0X") {
        &filtered[2..]
    } else {
        &filtered[..]
    };

    if let Some(bad) = digits.iter().find(|b| !b.is_ascii_hexdigit()) {
        return Err(invalid_key(origin, format!("found non-hex byte 0x{bad:02x}")));
    }

    if digits.len() != KEY_LEN * 2 {
        return Err(invalid_key(
            origin,
            format!(
                "hex key must contain exactly {} hex digits (got {})",
                KEY_LEN * 2,
                digits.len()
            ),
        ));
    }

    let key = Vec::from_hex(digits)
        .map_err(|err| invalid_key(origin, format!("hex decode failed: {err}")))?;
    let key = Zeroizing::new(key);

    if key.iter().all(|b| *b == 0) {
        return Err(invalid_key(origin, "key must not be all zeroes"));
    }

    Ok(key)
}

/// Write key material to `path` as `0x`-prefixed hex, applying restrictive permissions.
pub fn write_key_file(path: &Path, key: &[u8]) -> TwinvaultResult<()> {
    if key.len() != KEY_LEN {
        return Err(invalid_key(
            path,
            format!("key must be {KEY_LEN} bytes (got {})", key.len()),
        ));
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    if path.exists() {
        // A previous 0400 file would otherwise refuse the write.
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    let encoded = Zeroizing::new(format!("0x{}\n", hex::encode(key)));
    fs::write(path, encoded.as_bytes())?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o400))?;
    Ok(())
}

/// Produce fresh key material from the OS RNG.
pub fn generate_key() -> Zeroizing<Vec<u8>> {
    let mut key = Zeroizing::new(vec![0u8; KEY_LEN]);
    OsRng.fill_bytes(&mut key);
    key
}

/// Hex-encode the key as expected by the contract tooling.
pub fn key_to_hex(key: &[u8]) -> Zeroizing<String> {
    Zeroizing::new(format!("0x{}", hex::encode(key)))
}

/// Hex SHA-256 of the key, the value expected in `wallet.expected_sha256`.
pub fn checksum(key: &[u8]) -> String {
    hex::encode(Sha256::digest(key))
}

/// Make sure the loaded key matches the expected checksum when one is configured.
pub fn verify_checksum(key: &[u8], expected: Option<&str>) -> TwinvaultResult<()> {
    let Some(expected) = expected else {
        log::warn!("wallet.expected_sha256 not configured; skipping checksum verification");
        return Ok(());
    };
    let actual = checksum(key);
    if !expected.eq_ignore_ascii_case(&actual) {
        return Err(TwinvaultError::InvalidConfig(format!(
            "wallet.expected_sha256 mismatch: expected {}, got {}",
            expected, actual
        )));
    }
    Ok(())
}

fn invalid_key(path: &Path, reason: impl Into<String>) -> TwinvaultError {
    TwinvaultError::InvalidHexKey {
        path: PathBuf::from(path),
        reason: reason.into(),
    }
}
