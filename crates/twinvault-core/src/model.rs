//! Twin records, the twin index, and their persisted layout on the contract.

use crate::codec::InterestCodec;
use crate::error::{TwinvaultError, TwinvaultResult};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Contract key holding the list of every twin id.
pub const INDEX_KEY: &str = "twin_keys";

const RECORD_PREFIX: &str = "twin_";
const ID_SUFFIX_LEN: usize = 7;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Contract key for a single twin record.
pub fn record_key(id: &str) -> String {
    format!("{RECORD_PREFIX}{id}")
}

/// Fresh id in the `<unix millis>-<random base36>` shape.
pub fn generate_twin_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{millis}-{suffix}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterestCategory {
    Entertainment,
    Technology,
    Fashion,
    Sports,
    Finance,
}

impl InterestCategory {
    pub const ALL: [InterestCategory; 5] = [
        InterestCategory::Entertainment,
        InterestCategory::Technology,
        InterestCategory::Fashion,
        InterestCategory::Sports,
        InterestCategory::Finance,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            InterestCategory::Entertainment => "entertainment",
            InterestCategory::Technology => "technology",
            InterestCategory::Fashion => "fashion",
            InterestCategory::Sports => "sports",
            InterestCategory::Finance => "finance",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            InterestCategory::Entertainment => "Entertainment",
            InterestCategory::Technology => "Technology",
            InterestCategory::Fashion => "Fashion",
            InterestCategory::Sports => "Sports",
            InterestCategory::Finance => "Finance",
        }
    }
}

impl fmt::Display for InterestCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterestCategory {
    type Err = TwinvaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        InterestCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| TwinvaultError::InvalidInterest {
                category: s.to_string(),
                value: 0,
            })
    }
}

/// Plaintext interest scores, each within 0..=100.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterestProfile {
    values: BTreeMap<InterestCategory, u8>,
}

impl Default for InterestProfile {
    fn default() -> Self {
        Self {
            values: InterestCategory::ALL.into_iter().map(|c| (c, 50)).collect(),
        }
    }
}

impl InterestProfile {
    pub const MAX: i64 = 100;

    /// Build a profile from raw integers, rejecting anything outside 0..=100.
    pub fn from_values<I>(values: I) -> TwinvaultResult<Self>
    where
        I: IntoIterator<Item = (InterestCategory, i64)>,
    {
        let mut profile = Self::default();
        for (category, value) in values {
            profile.set(category, value)?;
        }
        Ok(profile)
    }

    pub fn set(&mut self, category: InterestCategory, value: i64) -> TwinvaultResult<()> {
        if !(0..=Self::MAX).contains(&value) {
            return Err(TwinvaultError::InvalidInterest {
                category: category.to_string(),
                value,
            });
        }
        self.values.insert(category, value as u8);
        Ok(())
    }

    pub fn get(&self, category: InterestCategory) -> u8 {
        self.values.get(&category).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (InterestCategory, u8)> + '_ {
        self.values.iter().map(|(c, v)| (*c, *v))
    }

    /// Encode every category, keyed by its lowercase name.
    pub fn encode_with<C: InterestCodec + ?Sized>(&self, codec: &C) -> BTreeMap<String, String> {
        self.iter()
            .map(|(c, v)| (c.as_str().to_string(), codec.encode(f64::from(v))))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TwinStatus {
    #[default]
    Active,
    Inactive,
}

impl TwinStatus {
    pub fn toggled(self) -> Self {
        match self {
            TwinStatus::Active => TwinStatus::Inactive,
            TwinStatus::Inactive => TwinStatus::Active,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TwinStatus::Active => "active",
            TwinStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for TwinStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One twin as seen by callers.
#[derive(Debug, Clone, PartialEq)]
pub struct TwinRecord {
    pub id: String,
    /// JSON object mapping category name to encoded value.
    pub encoded_interests: String,
    pub created_at: i64,
    pub owner: String,
    pub status: TwinStatus,
    pub earnings: String,
}

impl TwinRecord {
    /// Numeric earnings; anything unparsable counts as zero.
    pub fn earnings_value(&self) -> f64 {
        self.earnings
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .unwrap_or(0.0)
    }

    /// Case-insensitive substring match on id or owner; a blank term matches.
    pub fn matches(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        term.is_empty()
            || self.id.to_lowercase().contains(&term)
            || self.owner.to_lowercase().contains(&term)
    }

    pub fn is_owned_by(&self, address: &str) -> bool {
        self.owner.eq_ignore_ascii_case(address.trim())
    }

    /// Parse the encoded interests mapping.
    pub fn encoded_map(&self) -> TwinvaultResult<BTreeMap<String, String>> {
        serde_json::from_str(&self.encoded_interests).map_err(|err| TwinvaultError::Parse {
            key: record_key(&self.id),
            reason: format!("interests: {err}"),
        })
    }
}

fn default_earnings() -> String {
    "0".to_string()
}

/// Document stored under `twin_<id>`.
///
/// Fields this version does not know about are kept in `extra` so a status
/// rewrite never drops them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTwin {
    pub interests: String,
    pub timestamp: i64,
    pub owner: String,
    #[serde(default)]
    pub status: TwinStatus,
    #[serde(default = "default_earnings")]
    pub earnings: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StoredTwin {
    pub fn from_bytes(id: &str, bytes: &[u8]) -> TwinvaultResult<Self> {
        serde_json::from_slice(bytes).map_err(|err| TwinvaultError::Parse {
            key: record_key(id),
            reason: err.to_string(),
        })
    }

    pub fn to_bytes(&self) -> TwinvaultResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn into_record(self, id: &str) -> TwinRecord {
        TwinRecord {
            id: id.to_string(),
            encoded_interests: self.interests,
            created_at: self.timestamp,
            owner: self.owner,
            status: self.status,
            earnings: self.earnings,
        }
    }
}

/// Every twin id, stored under [`INDEX_KEY`] as a bare JSON array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TwinIndex {
    pub ids: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IndexRepr {
    Ids(Vec<String>),
    Wrapped { ids: Vec<String> },
}

impl TwinIndex {
    /// Decode the stored index. Empty bytes mean an empty index; an object
    /// carrying an `ids` array is read as well.
    pub fn from_bytes(bytes: &[u8]) -> TwinvaultResult<Self> {
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Self::default());
        }
        let repr: IndexRepr =
            serde_json::from_slice(bytes).map_err(|err| TwinvaultError::Parse {
                key: INDEX_KEY.to_string(),
                reason: err.to_string(),
            })?;
        let ids = match repr {
            IndexRepr::Ids(ids) | IndexRepr::Wrapped { ids } => ids,
        };
        Ok(Self { ids })
    }

    pub fn to_bytes(&self) -> TwinvaultResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|existing| existing == id)
    }

    /// The index with `id` appended once.
    pub fn appended(&self, id: &str) -> Self {
        let mut ids = self.ids.clone();
        if !self.contains(id) {
            ids.push(id.to_string());
        }
        Self { ids }
    }
}
