//! Device identity metadata and topic-root derivation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Vendor prefix dropped from device names when building topic roots
pub const DEVICE_NAME_PREFIX: &str = "Intel RealSense ";

/// Root of every device topic
pub const TOPIC_ROOT_PREFIX: &str = "realsense/";

/// Characters with special meaning in key expressions
const RESERVED_CHARS: &[char] = &['*', '$', '?', '#'];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum InfoError {
    #[error("Device name is empty")]
    EmptyName,

    #[error("Device serial is empty")]
    EmptySerial,

    #[error("Invalid topic root '{root}': {reason}")]
    InvalidTopicRoot { root: String, reason: String },
}

/// Build the topic root for a device, e.g. `realsense/D435/11223344`.
///
/// The vendor prefix is only stripped when the name is longer than the prefix
/// itself, so a bare "Intel RealSense " stays whole.
pub fn topic_root(name: &str, serial: &str) -> String {
    let model = match name.strip_prefix(DEVICE_NAME_PREFIX) {
        Some(rest) if !rest.is_empty() => rest,
        _ => name,
    };
    format!("{}{}/{}", TOPIC_ROOT_PREFIX, model, serial)
}

/// Immutable metadata for one physical device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub name: String,
    pub serial: String,
    #[serde(default)]
    pub product_line: String,
    #[serde(default)]
    pub locked: bool,
    pub topic_root: String,
}

impl DeviceInfo {
    /// Create device info, deriving the topic root from name and serial
    pub fn new(
        name: impl Into<String>,
        serial: impl Into<String>,
        product_line: impl Into<String>,
        locked: bool,
    ) -> Self {
        let name = name.into();
        let serial = serial.into();
        let topic_root = topic_root(&name, &serial);
        Self {
            name,
            serial,
            product_line: product_line.into(),
            locked,
            topic_root,
        }
    }

    /// Check the record is usable as a registry entry
    pub fn validate(&self) -> Result<(), InfoError> {
        if self.name.trim().is_empty() {
            return Err(InfoError::EmptyName);
        }
        if self.serial.trim().is_empty() {
            return Err(InfoError::EmptySerial);
        }
        validate_topic_root(&self.topic_root)
    }
}

fn validate_topic_root(root: &str) -> Result<(), InfoError> {
    let invalid = |reason: &str| InfoError::InvalidTopicRoot {
        root: root.to_string(),
        reason: reason.to_string(),
    };

    if root.is_empty() {
        return Err(invalid("empty"));
    }
    if root.starts_with('/') || root.ends_with('/') {
        return Err(invalid("leading or trailing '/'"));
    }
    if root.split('/').any(str::is_empty) {
        return Err(invalid("empty path chunk"));
    }
    if let Some(c) = root.chars().find(|c| RESERVED_CHARS.contains(c)) {
        return Err(invalid(&format!("reserved character '{}'", c)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_root_strips_vendor_prefix() {
        assert_eq!(
            topic_root("Intel RealSense D435", "11223344"),
            "realsense/D435/11223344"
        );
    }

    #[test]
    fn test_topic_root_keeps_unprefixed_name() {
        assert_eq!(topic_root("CustomCam", "99"), "realsense/CustomCam/99");
    }

    #[test]
    fn test_topic_root_bare_prefix_not_stripped() {
        assert_eq!(
            topic_root("Intel RealSense ", "1"),
            "realsense/Intel RealSense /1"
        );
        assert_eq!(topic_root("Intel", "1"), "realsense/Intel/1");
    }

    #[test]
    fn test_topic_root_prefix_is_case_sensitive() {
        assert_eq!(
            topic_root("intel realsense D455", "7"),
            "realsense/intel realsense D455/7"
        );
    }

    #[test]
    fn test_new_derives_topic_root() {
        let info = DeviceInfo::new("Intel RealSense L515", "f0000001", "L500", true);
        assert_eq!(info.topic_root, "realsense/L515/f0000001");
        assert!(info.locked);
        assert!(info.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_malformed() {
        let mut info = DeviceInfo::new("D435", "1", "D400", false);
        info.topic_root = "realsense//1".to_string();
        assert!(matches!(
            info.validate(),
            Err(InfoError::InvalidTopicRoot { .. })
        ));

        info.topic_root = "realsense/*/1".to_string();
        assert!(matches!(
            info.validate(),
            Err(InfoError::InvalidTopicRoot { .. })
        ));

        info.topic_root = "/realsense/D435/1".to_string();
        assert!(info.validate().is_err());

        let empty_serial = DeviceInfo::new("D435", "", "D400", false);
        assert_eq!(empty_serial.validate(), Err(InfoError::EmptySerial));

        let empty_name = DeviceInfo::new(" ", "1", "D400", false);
        assert_eq!(empty_name.validate(), Err(InfoError::EmptyName));
    }

    #[test]
    fn test_deserialize_defaults() {
        let info: DeviceInfo = serde_json::from_str(
            r#"{"name":"Intel RealSense D405","serial":"42","topic_root":"realsense/D405/42"}"#,
        )
        .unwrap();
        assert_eq!(info.product_line, "");
        assert!(!info.locked);
    }
}
