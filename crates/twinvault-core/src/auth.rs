//! Signature challenge shown to the wallet before interests are decoded.
//!
//! The signature is a confirmation step for the user. Nothing on the contract
//! side checks it, and this crate only checks that the proof covers the
//! expected challenge; it is not an access-control mechanism.

use crate::error::{TwinvaultError, TwinvaultResult};
use crate::kv::Signer;
use rand::Rng;
use std::fmt;

const PUBLIC_KEY_DIGITS: usize = 2000;

/// Random session public key stand-in: `0x` followed by 2000 hex digits.
pub fn generate_public_key() -> String {
    let mut rng = rand::thread_rng();
    let mut key = String::with_capacity(PUBLIC_KEY_DIGITS + 2);
    key.push_str("0x");
    for _ in 0..PUBLIC_KEY_DIGITS {
        let nibble: u32 = rng.gen_range(0..16);
        key.push(char::from_digit(nibble, 16).unwrap_or('0'));
    }
    key
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureChallenge {
    pub public_key: String,
    pub contract_address: String,
    pub chain_id: u64,
    pub start_timestamp: i64,
    pub duration_days: u32,
}

impl SignatureChallenge {
    /// Challenge for a new session starting now.
    pub fn new(contract_address: impl Into<String>, chain_id: u64, duration_days: u32) -> Self {
        Self {
            public_key: generate_public_key(),
            contract_address: contract_address.into(),
            chain_id,
            start_timestamp: chrono::Utc::now().timestamp(),
            duration_days,
        }
    }

    /// Canonical newline-separated message handed to the signer.
    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SignatureChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "publickey:{}\ncontractAddresses:{}\ncontractsChainId:{}\nstartTimestamp:{}\ndurationDays:{}",
            self.public_key,
            self.contract_address,
            self.chain_id,
            self.start_timestamp,
            self.duration_days
        )
    }
}

/// Signature a wallet produced over a challenge message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthProof {
    pub message: String,
    pub signature: String,
    pub signer: String,
}

impl AuthProof {
    /// Ask `signer` to sign the challenge.
    pub fn sign<S: Signer + ?Sized>(
        signer: &S,
        challenge: &SignatureChallenge,
    ) -> TwinvaultResult<Self> {
        let message = challenge.message();
        let signature = signer.sign_message(&message)?;
        Ok(Self {
            message,
            signature,
            signer: signer.address()?,
        })
    }

    /// Check that this proof answers `challenge`. The signature bytes are not
    /// verified cryptographically.
    pub fn confirm(&self, challenge: &SignatureChallenge) -> TwinvaultResult<()> {
        if self.message != challenge.message() {
            return Err(TwinvaultError::Signature(
                "signed message does not match the current challenge".to_string(),
            ));
        }
        if self.signature.trim().trim_start_matches("0x").is_empty() {
            return Err(TwinvaultError::Signature("signature is empty".to_string()));
        }
        Ok(())
    }
}
