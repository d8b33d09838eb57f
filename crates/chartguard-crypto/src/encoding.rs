//! Base64 text encoding for every byte value that reaches disk.
//!
//! Standard alphabet with padding. The serde helpers are meant for
//! `#[serde(with = "...")]` on byte fields.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

pub fn encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

pub fn decode(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(s)
}

/// Fixed-size byte arrays, rejected on length mismatch.
pub mod base64_array {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer, const N: usize>(
        bytes: &[u8; N],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        deserializer: D,
    ) -> Result<[u8; N], D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = super::decode(&s).map_err(|e| D::Error::custom(format!("base64: {e}")))?;
        <[u8; N]>::try_from(bytes.as_slice()).map_err(|_| {
            D::Error::custom(format!("expected {N} bytes, got {}", bytes.len()))
        })
    }
}

/// Variable-length byte vectors.
pub mod base64_vec {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::decode(&s).map_err(|e| D::Error::custom(format!("base64: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        #[serde(with = "base64_array")]
        fixed: [u8; 4],
        #[serde(with = "base64_vec")]
        var: Vec<u8>,
    }

    #[test]
    fn test_encode_is_padded_standard() {
        assert_eq!(encode(b"ab"), "YWI=");
        assert_eq!(decode("YWI=").unwrap(), b"ab");
    }

    #[test]
    fn test_serde_helpers() {
        let sample = Sample {
            fixed: [1, 2, 3, 4],
            var: vec![0xff; 5],
        };
        let json = serde_json::to_string(&sample).unwrap();
        assert_eq!(json, r#"{"fixed":"AQIDBA==","var":"//////8="}"#);
        let back: Sample = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample);
    }

    #[test]
    fn test_array_wrong_length_rejected() {
        let json = r#"{"fixed":"AQID","var":""}"#;
        let err = serde_json::from_str::<Sample>(json).unwrap_err();
        assert!(err.to_string().contains("expected 4 bytes"));
    }

    #[test]
    fn test_invalid_base64_rejected() {
        let json = r#"{"fixed":"AQIDBA==","var":"not base64!"}"#;
        assert!(serde_json::from_str::<Sample>(json).is_err());
    }
}
