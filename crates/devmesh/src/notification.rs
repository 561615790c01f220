//! Messages a device publishes on its notification topic.
//!
//! A reader joining the topic first receives a device header announcing how
//! many profiles follow, then one batch of profiles per stream group.

use crate::device::catalog::{MotionProfile, VideoProfile};
use serde::{Deserialize, Serialize};

/// Suffix appended to a topic root to reach the notification topic
pub const NOTIFICATION_SUFFIX: &str = "notification";

/// Key of the notification topic for a device topic root
pub fn notification_topic(topic_root: &str) -> String {
    format!("{}/{}", topic_root, NOTIFICATION_SUFFIX)
}

/// Leading message: total number of profiles the device will announce
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceHeader {
    pub num_of_streams: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoStreamProfiles {
    pub group_name: String,
    pub profiles: Vec<VideoProfile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionStreamProfiles {
    pub group_name: String,
    pub profiles: Vec<MotionProfile>,
}

/// One message on the notification topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    DeviceHeader(DeviceHeader),
    VideoStreamProfiles(VideoStreamProfiles),
    MotionStreamProfiles(MotionStreamProfiles),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::catalog::{Format, StreamType};

    #[test]
    fn test_notification_topic() {
        assert_eq!(
            notification_topic("realsense/D435/11223344"),
            "realsense/D435/11223344/notification"
        );
    }

    #[test]
    fn test_decode_tagged_messages() {
        let header: Notification =
            serde_json::from_str(r#"{"type":"device_header","num_of_streams":2}"#).unwrap();
        assert_eq!(
            header,
            Notification::DeviceHeader(DeviceHeader { num_of_streams: 2 })
        );

        let motion: Notification = serde_json::from_str(
            r#"{"type":"motion_stream_profiles","group_name":"Motion Module","profiles":[
                {"stream_index":0,"unique_id":9,"fps":200,"format":"motion_xyz32f","stream_type":"gyro","is_default":true}
            ]}"#,
        )
        .unwrap();
        match motion {
            Notification::MotionStreamProfiles(m) => {
                assert_eq!(m.group_name, "Motion Module");
                assert_eq!(m.profiles.len(), 1);
                assert_eq!(m.profiles[0].format, Format::MotionXyz32f);
                assert_eq!(m.profiles[0].stream_type, StreamType::Gyro);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }
}
