use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{CacheError, Result};

const FINGERPRINT_LEN: usize = 64;

// Hex SHA-256 of a request's canonical form
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    // first 8 hex chars, enough for log lines
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }

    fn is_valid(hex: &str) -> bool {
        hex.len() == FINGERPRINT_LEN
            && hex.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Only 64 lowercase hex chars are accepted; the rejected string is handed back
impl TryFrom<String> for Fingerprint {
    type Error = String;

    fn try_from(hex: String) -> std::result::Result<Self, Self::Error> {
        if Self::is_valid(&hex) {
            Ok(Fingerprint(hex))
        } else {
            Err(hex)
        }
    }
}

// keys come from the cache file, so a bad one fails the whole load
impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let hex = String::deserialize(deserializer)?;
        Fingerprint::try_from(hex).map_err(|bad| {
            serde::de::Error::custom(format!("invalid cache key {:?}", bad))
        })
    }
}

// Cached payload with its last access time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub payload: String,
    pub last_accessed: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(payload: String, now: DateTime<Utc>) -> Self {
        Self {
            payload,
            last_accessed: now,
        }
    }

    pub fn size(&self) -> u64 {
        self.payload.len() as u64
    }
}

/// Serialize `request` into its canonical byte form.
///
/// The value goes through `serde_json::Value` first. Its object type is a
/// `BTreeMap`, so keys come out sorted at every depth no matter which map type
/// the caller used (a `HashMap` of options hashes the same on every run).
pub fn canonical_bytes<T: Serialize + ?Sized>(request: &T) -> Result<Vec<u8>> {
    let value = serde_json::to_value(request).map_err(CacheError::Serialization)?;
    serde_json::to_vec(&value).map_err(CacheError::Serialization)
}

// Create a cache key (hash of the canonical request)
pub fn fingerprint<T: Serialize + ?Sized>(request: &T) -> Result<Fingerprint> {
    let bytes = canonical_bytes(request)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(Fingerprint(format!("{:x}", hasher.finalize())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChatMessage, ChatRequest};
    use serde_json::json;
    use std::collections::HashMap;

    fn base_request() -> ChatRequest {
        ChatRequest::new("llama3", vec![ChatMessage::user("Tell me a joke.")])
            .with_seed(12345)
            .with_max_tokens(100)
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let k1 = fingerprint(&base_request()).unwrap();
        let k2 = fingerprint(&base_request()).unwrap();
        assert_eq!(k1, k2);
        assert_eq!(k1.as_str().len(), 64);
        assert!(k1.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_model_aware() {
        let mut other = base_request();
        other.model = "mistral".into();
        assert_ne!(fingerprint(&base_request()).unwrap(), fingerprint(&other).unwrap());
    }

    #[test]
    fn test_fingerprint_trailing_whitespace() {
        let mut other = base_request();
        other.messages[0].content.push(' ');
        assert_ne!(fingerprint(&base_request()).unwrap(), fingerprint(&other).unwrap());
    }

    #[test]
    fn test_fingerprint_seed_and_max_tokens_aware() {
        let seeded = base_request().with_seed(54321);
        let longer = base_request().with_max_tokens(101);
        let base = fingerprint(&base_request()).unwrap();
        assert_ne!(base, fingerprint(&seeded).unwrap());
        assert_ne!(base, fingerprint(&longer).unwrap());

        let mut unseeded = base_request();
        unseeded.seed = None;
        assert_ne!(base, fingerprint(&unseeded).unwrap());
    }

    #[test]
    fn test_fingerprint_role_aware() {
        let mut other = base_request();
        other.messages = vec![ChatMessage::system("Tell me a joke.")];
        assert_ne!(fingerprint(&base_request()).unwrap(), fingerprint(&other).unwrap());
    }

    #[test]
    fn test_fingerprint_ignores_map_insertion_order() {
        let mut a = HashMap::new();
        let mut b = HashMap::new();
        for i in 0..32 {
            a.insert(format!("k{i}"), i);
        }
        for i in (0..32).rev() {
            b.insert(format!("k{i}"), i);
        }
        assert_eq!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
    }

    #[test]
    fn test_canonical_bytes_sorts_nested_keys() {
        let request = json!({"b": {"z": 1, "a": 2}, "a": [ {"y": 1, "x": 2} ]});
        let bytes = canonical_bytes(&request).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"a":[{"x":2,"y":1}],"b":{"a":2,"z":1}}"#
        );
    }

    #[test]
    fn test_fingerprint_options_aware() {
        let warm = base_request().with_option("temperature", json!(0.7));
        let cold = base_request().with_option("temperature", json!(0.0));
        assert_ne!(fingerprint(&warm).unwrap(), fingerprint(&cold).unwrap());
    }

    #[test]
    fn test_fingerprint_key_validation() {
        let good = fingerprint(&base_request()).unwrap();
        assert!(Fingerprint::try_from(good.as_str().to_string()).is_ok());
        assert!(Fingerprint::try_from("ab".to_string()).is_err());
        assert!(Fingerprint::try_from(good.as_str().to_uppercase()).is_err());
        assert!(Fingerprint::try_from(format!("a{}", "é".repeat(31))).is_err());
        assert_eq!(good.short(), &good.as_str()[..8]);
    }

    #[test]
    fn test_deserialize_rejects_bad_keys() {
        let err = serde_json::from_str::<Fingerprint>(r#""aéééé""#).unwrap_err();
        assert!(err.to_string().contains("invalid cache key"));
        let valid = format!("\"{}\"", "0".repeat(64));
        assert!(serde_json::from_str::<Fingerprint>(&valid).is_ok());
    }

    #[test]
    fn test_fingerprint_rejects_unserializable() {
        // non-string map keys cannot become JSON object keys
        let mut bad = HashMap::new();
        bad.insert(vec![1u8], "x");
        assert!(matches!(fingerprint(&bad), Err(CacheError::Serialization(_))));
    }
}
