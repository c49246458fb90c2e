//! Placeholder "homomorphic" codec for interest values.
//!
//! Nothing in here is confidential: values are base64 of their decimal text,
//! tagged so they can be told apart from raw numbers. Callers only depend on
//! [`InterestCodec`], so a real scheme can replace [`PlaceholderCodec`]
//! without touching the repository.

use base64::{engine::general_purpose::STANDARD, Engine};
use std::fmt;
use std::str::FromStr;

/// Prefix marking a value produced by [`PlaceholderCodec::encode`].
pub const ENCODED_TAG: &str = "FHE-";

/// Scalar operation applied to an encoded value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    IncreaseTenPercent,
    DecreaseTenPercent,
    Double,
    Identity,
}

impl Transform {
    pub fn multiplier(self) -> f64 {
        match self {
            Transform::IncreaseTenPercent => 1.1,
            Transform::DecreaseTenPercent => 0.9,
            Transform::Double => 2.0,
            Transform::Identity => 1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Transform::IncreaseTenPercent => "increase10%",
            Transform::DecreaseTenPercent => "decrease10%",
            Transform::Double => "double",
            Transform::Identity => "identity",
        }
    }
}

impl FromStr for Transform {
    type Err = std::convert::Infallible;

    /// Unknown names fall back to `Identity`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "increase10%" => Transform::IncreaseTenPercent,
            "decrease10%" => Transform::DecreaseTenPercent,
            "double" => Transform::Double,
            _ => Transform::Identity,
        })
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Seam for whatever scheme protects interest values.
pub trait InterestCodec {
    /// Encode a numeric value into its stored text form.
    fn encode(&self, value: f64) -> String;

    /// Recover the numeric value. Malformed input yields `NaN`, never an error;
    /// callers must treat non-finite results as invalid.
    fn decode(&self, encoded: &str) -> f64;

    /// Apply `op` to an encoded value and return the re-encoded result.
    fn transform(&self, encoded: &str, op: Transform) -> String {
        self.encode(self.decode(encoded) * op.multiplier())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderCodec;

impl InterestCodec for PlaceholderCodec {
    fn encode(&self, value: f64) -> String {
        format!("{ENCODED_TAG}{}", STANDARD.encode(value.to_string()))
    }

    fn decode(&self, encoded: &str) -> f64 {
        match encoded.strip_prefix(ENCODED_TAG) {
            Some(body) => STANDARD
                .decode(body)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
                .and_then(|text| text.trim().parse::<f64>().ok())
                .unwrap_or(f64::NAN),
            None => encoded.trim().parse::<f64>().unwrap_or(f64::NAN),
        }
    }
}

/// Shorten a ciphertext for display, appending an ellipsis when truncated.
pub fn preview(encoded: &str, max_chars: usize) -> String {
    if encoded.chars().count() <= max_chars {
        return encoded.to_string();
    }
    let head: String = encoded.chars().take(max_chars).collect();
    format!("{head}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_is_tagged_and_reversible() {
        let codec = PlaceholderCodec;
        for v in 0..=100 {
            let encoded = codec.encode(v as f64);
            assert!(encoded.starts_with(ENCODED_TAG), "{encoded}");
            assert_eq!(codec.decode(&encoded), v as f64);
        }
    }

    #[test]
    fn encode_matches_known_vector() {
        // "50" in base64
        assert_eq!(PlaceholderCodec.encode(50.0), "FHE-NTA=");
    }

    #[test]
    fn decode_accepts_untagged_numbers() {
        assert_eq!(PlaceholderCodec.decode("42"), 42.0);
        assert_eq!(PlaceholderCodec.decode(" 7.5 "), 7.5);
    }

    #[test]
    fn decode_of_garbage_is_nan() {
        let codec = PlaceholderCodec;
        assert!(codec.decode("FHE-!!!notbase64").is_nan());
        assert!(codec.decode("FHE-aGVsbG8=").is_nan());
        assert!(codec.decode("hello").is_nan());
        assert!(codec.decode("").is_nan());
    }

    #[test]
    fn transforms_apply_their_multiplier() {
        let codec = PlaceholderCodec;
        for v in [0.0, 1.0, 37.0, 50.0, 100.0] {
            let e = codec.encode(v);
            let base = codec.decode(&e);
            assert_eq!(codec.decode(&codec.transform(&e, Transform::Double)), 2.0 * base);
            assert_eq!(
                codec.decode(&codec.transform(&e, Transform::IncreaseTenPercent)),
                base * 1.1
            );
            assert_eq!(
                codec.decode(&codec.transform(&e, Transform::DecreaseTenPercent)),
                base * 0.9
            );
            assert_eq!(codec.decode(&codec.transform(&e, Transform::Identity)), base);
        }
    }

    #[test]
    fn unknown_operation_is_identity() {
        let codec = PlaceholderCodec;
        let e = codec.encode(64.0);
        let op: Transform = "triple".parse().unwrap();
        assert_eq!(op, Transform::Identity);
        assert_eq!(codec.decode(&codec.transform(&e, op)), 64.0);
        assert_eq!("double".parse::<Transform>().unwrap(), Transform::Double);
    }

    #[test]
    fn preview_truncates_long_values() {
        assert_eq!(preview("FHE-NTA=", 10), "FHE-NTA=");
        assert_eq!(preview("FHE-MTAuNQ==", 10), "FHE-MTAuNQ...");
    }
}
