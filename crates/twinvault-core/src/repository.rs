//! Twin repository: the twin index plus one record per twin, layered on a
//! [`KvClient`].
//!
//! A create is two writes (record, then index) and is not atomic. The index
//! is a plain JSON array that only grows, so it is updated with a conditional
//! write against its previous bytes and retried with backoff. Two concurrent
//! creates therefore do not drop each other's ids; but if the index write
//! ultimately fails, the record already written stays on the contract without
//! being listed. That orphan is logged and the error returned to the caller.

use crate::auth::{AuthProof, SignatureChallenge};
use crate::codec::{InterestCodec, PlaceholderCodec, Transform};
use crate::config::TwinvaultConfig;
use crate::error::{TwinvaultError, TwinvaultResult};
use crate::kv::KvClient;
use crate::model::{
    generate_twin_id, record_key, InterestCategory, InterestProfile, StoredTwin, TwinIndex,
    TwinRecord, TwinStatus, INDEX_KEY,
};
use log::{debug, error, info, warn};
use serde_json::Map;
use std::cmp::min;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

/// Attempts at finding an id whose record key is still free.
const ID_ATTEMPTS: u32 = 3;

/// Coordinates configuration, the contract client, and the codec.
pub struct TwinRepository<K: KvClient, C: InterestCodec = PlaceholderCodec> {
    config: Arc<TwinvaultConfig>,
    client: K,
    codec: C,
}

impl<K: KvClient> TwinRepository<K> {
    /// Build a repository using the placeholder codec.
    pub fn new(config: Arc<TwinvaultConfig>, client: K) -> Self {
        Self::with_codec(config, client, PlaceholderCodec)
    }
}

impl<K: KvClient, C: InterestCodec> TwinRepository<K, C> {
    pub fn with_codec(config: Arc<TwinvaultConfig>, client: K, codec: C) -> Self {
        Self {
            config,
            client,
            codec,
        }
    }

    pub fn client(&self) -> &K {
        &self.client
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn config(&self) -> &TwinvaultConfig {
        &self.config
    }

    /// Every indexed twin, newest first.
    ///
    /// Never fails: an unavailable contract or unreadable index yields an
    /// empty list, and index entries whose record is missing or corrupt are
    /// skipped.
    pub fn list(&self) -> Vec<TwinRecord> {
        if !self.client.is_available() {
            warn!("contract unavailable; returning empty twin list");
            return Vec::new();
        }

        let index = match self
            .client
            .get(INDEX_KEY)
            .and_then(|bytes| TwinIndex::from_bytes(&bytes))
        {
            Ok(index) => index,
            Err(err) => {
                warn!("failed to read twin index: {err}");
                return Vec::new();
            }
        };

        let mut seen = HashSet::new();
        let mut records = Vec::with_capacity(index.ids.len());
        for id in &index.ids {
            if !seen.insert(id.as_str()) {
                continue;
            }
            match self.load(id) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => warn!("twin {id} is indexed but has no stored record; skipping"),
                Err(err) => warn!("skipping twin {id}: {err}"),
            }
        }

        // stable: equal timestamps keep index order
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }

    /// Fetch a single twin by id.
    pub fn get(&self, id: &str) -> TwinvaultResult<TwinRecord> {
        if !self.client.is_available() {
            return Err(TwinvaultError::Unavailable);
        }
        self.load(id)?
            .ok_or_else(|| TwinvaultError::NotFound(id.to_string()))
    }

    /// Encode `interests`, store a new active twin owned by `owner`, and
    /// append it to the index.
    pub fn create(&self, owner: &str, interests: &InterestProfile) -> TwinvaultResult<TwinRecord> {
        if !self.client.is_available() {
            return Err(TwinvaultError::Unavailable);
        }

        let encoded = interests.encode_with(&self.codec);
        let stored = StoredTwin {
            interests: serde_json::to_string(&encoded)?,
            timestamp: chrono::Utc::now().timestamp(),
            owner: owner.trim().to_string(),
            status: TwinStatus::Active,
            earnings: "0".to_string(),
            extra: Map::new(),
        };

        let id = self.fresh_id()?;
        self.client.set(&record_key(&id), &stored.to_bytes()?)?;
        debug!("stored record for twin {id}");

        if let Err(err) = self.append_to_index(&id) {
            error!("twin {id} was stored but could not be indexed and is now orphaned: {err}");
            return Err(err);
        }

        info!("created twin {id} for {}", stored.owner);
        Ok(stored.into_record(&id))
    }

    /// Set the status of twin `id`. Only its owner may do so.
    pub fn set_status(
        &self,
        id: &str,
        caller: &str,
        status: TwinStatus,
    ) -> TwinvaultResult<TwinRecord> {
        if !self.client.is_available() {
            return Err(TwinvaultError::Unavailable);
        }

        let key = record_key(id);
        let bytes = self.client.get(&key)?;
        if bytes.is_empty() {
            return Err(TwinvaultError::NotFound(id.to_string()));
        }
        let mut stored = StoredTwin::from_bytes(id, &bytes)?;

        if !stored.owner.eq_ignore_ascii_case(caller.trim()) {
            return Err(TwinvaultError::Unauthorized {
                id: id.to_string(),
                caller: caller.to_string(),
            });
        }

        if stored.status == status {
            debug!("twin {id} already {status}; nothing to write");
            return Ok(stored.into_record(id));
        }

        stored.status = status;
        self.client.set(&key, &stored.to_bytes()?)?;
        info!("twin {id} is now {status}");
        Ok(stored.into_record(id))
    }

    /// Flip the status of twin `id` between active and inactive.
    pub fn toggle_status(&self, id: &str, caller: &str) -> TwinvaultResult<TwinRecord> {
        let current = self.get(id)?;
        self.set_status(id, caller, current.status.toggled())
    }

    /// Challenge for the current contract, ready to be signed.
    pub fn challenge(&self) -> TwinvaultResult<SignatureChallenge> {
        Ok(SignatureChallenge::new(
            self.client.contract_address()?,
            self.config.contract.chain_id,
            self.config.decrypt.duration_days,
        ))
    }

    /// Decode every field of `encoded_interests` once the user has signed
    /// `challenge`.
    ///
    /// The proof gates the user flow only; see [`crate::auth`]. Values that
    /// fail to decode come back as `NaN`.
    pub fn decrypt_interests(
        &self,
        encoded_interests: &str,
        proof: &AuthProof,
        challenge: &SignatureChallenge,
    ) -> TwinvaultResult<BTreeMap<String, f64>> {
        proof.confirm(challenge)?;

        let delay = self.config.confirm_delay();
        if !delay.is_zero() {
            sleep(delay);
        }

        let encoded: BTreeMap<String, String> =
            serde_json::from_str(encoded_interests).map_err(|err| TwinvaultError::Parse {
                key: "interests".to_string(),
                reason: err.to_string(),
            })?;

        let decoded: BTreeMap<String, f64> = encoded
            .into_iter()
            .map(|(category, value)| {
                let plain = self.codec.decode(&value);
                if !plain.is_finite() {
                    warn!("interest {category} did not decode to a finite value");
                }
                (category, plain)
            })
            .collect();
        Ok(decoded)
    }

    /// Apply `op` to one encoded interest of twin `id` without storing the result.
    pub fn compute(
        &self,
        id: &str,
        category: InterestCategory,
        op: Transform,
    ) -> TwinvaultResult<String> {
        let record = self.get(id)?;
        let encoded = record.encoded_map()?;
        let value = encoded
            .get(category.as_str())
            .ok_or_else(|| TwinvaultError::Parse {
                key: record_key(id),
                reason: format!("interest `{category}` missing"),
            })?;
        Ok(self.codec.transform(value, op))
    }

    /// Read and parse one record; `None` when the key is empty.
    fn load(&self, id: &str) -> TwinvaultResult<Option<TwinRecord>> {
        let bytes = self.client.get(&record_key(id))?;
        if bytes.is_empty() {
            return Ok(None);
        }
        Ok(Some(StoredTwin::from_bytes(id, &bytes)?.into_record(id)))
    }

    /// Generate an id whose record key is not taken yet.
    fn fresh_id(&self) -> TwinvaultResult<String> {
        for _ in 0..ID_ATTEMPTS {
            let id = generate_twin_id();
            if self.client.get(&record_key(&id))?.is_empty() {
                return Ok(id);
            }
            warn!("generated twin id {id} already in use; retrying");
        }
        Err(TwinvaultError::Provider(
            "could not generate an unused twin id".to_string(),
        ))
    }

    /// Append `id` to the index with a conditional write, backing off and
    /// re-reading when another writer got there first.
    fn append_to_index(&self, id: &str) -> TwinvaultResult<()> {
        let policy = &self.config.retry;
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt: u32 = 0;
        let mut delay_ms = policy.base_delay_ms.max(1);

        loop {
            attempt += 1;
            let current = self.client.get(INDEX_KEY)?;
            let index = TwinIndex::from_bytes(&current)?;
            let next = index.appended(id);

            if self
                .client
                .compare_and_set(INDEX_KEY, &current, &next.to_bytes()?)?
            {
                debug!("index now holds {} ids", next.ids.len());
                return Ok(());
            }

            if attempt >= max_attempts {
                return Err(TwinvaultError::IndexConflict { attempts: attempt });
            }

            let jitter_ms = if policy.jitter_ratio > 0.0 {
                let pseudo = ((attempt * 37) % 100) as f64 / 100.0 - 0.5;
                let factor = 1.0 + (policy.jitter_ratio * pseudo);
                ((delay_ms as f64 * factor).max(1.0)).round() as u64
            } else {
                delay_ms
            };

            warn!(
                "twin index changed underneath us (attempt {attempt}/{max_attempts}); retrying in {jitter_ms}ms"
            );
            sleep(Duration::from_millis(jitter_ms));
            delay_ms = min(delay_ms.saturating_mul(2), policy.max_delay_ms.max(1));
        }
    }
}
