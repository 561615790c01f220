//! Network identity of the remote writer that declared a device.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of a GUID in bytes (12-byte participant prefix + 4-byte entity id)
pub const GUID_LEN: usize = 16;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum GuidError {
    #[error("Invalid GUID hex: {0}")]
    InvalidHex(String),

    #[error("Invalid GUID length: expected {GUID_LEN} bytes, got {0}")]
    InvalidLength(usize),
}

/// Globally unique identifier of a remote endpoint.
///
/// Rendered as 32 lowercase hex digits. Parsing also accepts the dotted form
/// where 4-byte words are separated by `.`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Guid([u8; GUID_LEN]);

impl Guid {
    pub const fn from_bytes(bytes: [u8; GUID_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for Guid {
    type Err = GuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s.trim().chars().filter(|c| *c != '.').collect();
        let bytes = hex::decode(&compact).map_err(|e| GuidError::InvalidHex(e.to_string()))?;
        let bytes: [u8; GUID_LEN] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| GuidError::InvalidLength(b.len()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Guid {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Guid {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Guid {
        Guid::from_bytes([
            0x01, 0x0f, 0xa2, 0x3b, 0x00, 0x00, 0x00, 0x01, 0xde, 0xad, 0xbe, 0xef, 0x00, 0x00,
            0x01, 0x03,
        ])
    }

    #[test]
    fn test_display_is_lowercase_hex() {
        assert_eq!(sample().to_string(), "010fa23b00000001deadbeef00000103");
    }

    #[test]
    fn test_parse_plain_and_dotted() {
        let plain: Guid = "010fa23b00000001deadbeef00000103".parse().unwrap();
        let dotted: Guid = "010fa23b.00000001.deadbeef.00000103".parse().unwrap();
        assert_eq!(plain, sample());
        assert_eq!(dotted, sample());
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!(
            "zz".parse::<Guid>(),
            Err(GuidError::InvalidHex(_))
        ));
        assert_eq!("0102".parse::<Guid>(), Err(GuidError::InvalidLength(2)));
    }

    #[test]
    fn test_serde_uses_hex_string() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert_eq!(json, "\"010fa23b00000001deadbeef00000103\"");
        let back: Guid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample());
    }
}
