use crate::error::TwinvaultResult;

/// Abstraction over the on-chain key/value contract.
///
/// Implementations are expected to provide a thin, testable surface over the
/// underlying transport (CLI, RPC, etc.), so the repository can be exercised
/// without a live chain. Clients built without a signing credential are
/// read-only and must fail `set` with `TwinvaultError::Transaction`.
pub trait KvClient {
    /// Liveness probe. Errors while probing count as unavailable.
    fn is_available(&self) -> bool;

    /// Value stored under `key`, or an empty vector when the key is absent.
    fn get(&self, key: &str) -> TwinvaultResult<Vec<u8>>;

    /// Store `value` under `key`. This is an on-chain mutation.
    fn set(&self, key: &str, value: &[u8]) -> TwinvaultResult<()>;

    /// Replace the value under `key` only if it still equals `expected`.
    /// Returns `false` without writing when the stored value has moved on.
    ///
    /// The default implementation reads then writes and is therefore only as
    /// strong as the gap between those two calls; contracts with a native
    /// conditional write should override it.
    fn compare_and_set(&self, key: &str, expected: &[u8], value: &[u8]) -> TwinvaultResult<bool> {
        let current = self.get(key)?;
        if current != expected {
            return Ok(false);
        }
        self.set(key, value)?;
        Ok(true)
    }

    /// Address of the contract this client talks to.
    fn contract_address(&self) -> TwinvaultResult<String>;
}

/// Wallet able to sign plain-text messages.
pub trait Signer {
    /// Address the signatures belong to.
    fn address(&self) -> TwinvaultResult<String>;

    /// Sign `message`, returning the signature as hex. A user refusing to sign
    /// surfaces as `TwinvaultError::Signature`.
    fn sign_message(&self, message: &str) -> TwinvaultResult<String>;
}

impl<T: KvClient + ?Sized> KvClient for &T {
    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    fn get(&self, key: &str) -> TwinvaultResult<Vec<u8>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> TwinvaultResult<()> {
        (**self).set(key, value)
    }

    fn compare_and_set(&self, key: &str, expected: &[u8], value: &[u8]) -> TwinvaultResult<bool> {
        (**self).compare_and_set(key, expected, value)
    }

    fn contract_address(&self) -> TwinvaultResult<String> {
        (**self).contract_address()
    }
}
