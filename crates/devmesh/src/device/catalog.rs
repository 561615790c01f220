//! Stream catalog: stream groups, streams and their profiles.
//!
//! A catalog is built by value during enumeration and installed on the device
//! once complete. After that it is only read.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Duplicate profile unique id {0}")]
    DuplicateUniqueId(i16),
}

pub type Result<T> = std::result::Result<T, CatalogError>;

/// Kind of data a stream carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamType {
    Any,
    Depth,
    Color,
    Infrared,
    Fisheye,
    Gyro,
    Accel,
    Gpio,
    Pose,
    Confidence,
}

impl StreamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamType::Any => "Any",
            StreamType::Depth => "Depth",
            StreamType::Color => "Color",
            StreamType::Infrared => "Infrared",
            StreamType::Fisheye => "Fisheye",
            StreamType::Gyro => "Gyro",
            StreamType::Accel => "Accel",
            StreamType::Gpio => "Gpio",
            StreamType::Pose => "Pose",
            StreamType::Confidence => "Confidence",
        }
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pixel or sample format of a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    Any,
    Z16,
    Disparity16,
    Xyz32f,
    Yuyv,
    Rgb8,
    Bgr8,
    Rgba8,
    Bgra8,
    Y8,
    Y16,
    Raw8,
    Raw10,
    Raw16,
    Uyvy,
    MotionRaw,
    MotionXyz32f,
    GpioRaw,
    SixDof,
    Y10bpack,
    Distance,
    Mjpeg,
    Y8i,
    Y12i,
    Combined,
}

/// A video stream configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoProfile {
    pub stream_index: i8,
    pub unique_id: i16,
    pub fps: i16,
    pub format: Format,
    pub stream_type: StreamType,
    pub width: i16,
    pub height: i16,
    #[serde(default)]
    pub is_default: bool,
}

/// A motion (IMU-style) stream configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionProfile {
    pub stream_index: i8,
    pub unique_id: i16,
    pub fps: i16,
    pub format: Format,
    pub stream_type: StreamType,
    #[serde(default)]
    pub is_default: bool,
}

/// One concrete configuration a stream can be activated with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Profile {
    Video(VideoProfile),
    Motion(MotionProfile),
}

impl Profile {
    pub fn unique_id(&self) -> i16 {
        match self {
            Profile::Video(p) => p.unique_id,
            Profile::Motion(p) => p.unique_id,
        }
    }

    pub fn stream_type(&self) -> StreamType {
        match self {
            Profile::Video(p) => p.stream_type,
            Profile::Motion(p) => p.stream_type,
        }
    }

    fn set_default(&mut self, is_default: bool) {
        match self {
            Profile::Video(p) => p.is_default = is_default,
            Profile::Motion(p) => p.is_default = is_default,
        }
    }

    /// Whether two profiles describe the same configuration, ignoring the default flag
    pub fn same_configuration(&self, other: &Profile) -> bool {
        match (self, other) {
            (Profile::Video(a), Profile::Video(b)) => {
                a.unique_id == b.unique_id
                    && a.stream_index == b.stream_index
                    && a.stream_type == b.stream_type
                    && a.format == b.format
                    && a.fps == b.fps
                    && a.width == b.width
                    && a.height == b.height
            }
            (Profile::Motion(a), Profile::Motion(b)) => {
                a.unique_id == b.unique_id
                    && a.stream_index == b.stream_index
                    && a.stream_type == b.stream_type
                    && a.format == b.format
                    && a.fps == b.fps
            }
            _ => false,
        }
    }
}

impl From<VideoProfile> for Profile {
    fn from(p: VideoProfile) -> Self {
        Profile::Video(p)
    }
}

impl From<MotionProfile> for Profile {
    fn from(p: MotionProfile) -> Self {
        Profile::Motion(p)
    }
}

/// A stream and its profiles in discovery order
#[derive(Debug, Clone)]
pub struct Stream {
    name: String,
    stream_type: StreamType,
    group_name: String,
    profiles: Vec<Profile>,
    default_profile: Option<usize>,
}

impl Stream {
    fn new(group_name: &str, stream_type: StreamType) -> Self {
        Self {
            name: stream_type.to_string(),
            stream_type,
            group_name: group_name.to_string(),
            profiles: Vec::new(),
            default_profile: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stream_type(&self) -> StreamType {
        self.stream_type
    }

    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    /// The profile currently marked as default, if any
    pub fn default_profile(&self) -> Option<&Profile> {
        self.default_profile.and_then(|i| self.profiles.get(i))
    }

    // The stored record's flag always agrees with `default_profile`
    fn push(&mut self, mut profile: Profile, is_default: bool) {
        profile.set_default(is_default);
        if is_default {
            if let Some(previous) = self.default_profile.and_then(|i| self.profiles.get_mut(i)) {
                log::warn!(
                    "Stream '{}' in group '{}': default profile {} replaced by {}",
                    self.name,
                    self.group_name,
                    previous.unique_id(),
                    profile.unique_id()
                );
                previous.set_default(false);
            }
            self.default_profile = Some(self.profiles.len());
        }
        self.profiles.push(profile);
    }

    fn is_default(&self, index: usize) -> bool {
        self.default_profile == Some(index)
    }

    fn foreach_video(&self, f: &mut impl FnMut(&VideoProfile, bool)) -> usize {
        let mut count = 0;
        for (i, profile) in self.profiles.iter().enumerate() {
            if let Profile::Video(p) = profile {
                f(p, self.is_default(i));
                count += 1;
            }
        }
        count
    }

    fn foreach_motion(&self, f: &mut impl FnMut(&MotionProfile, bool)) -> usize {
        let mut count = 0;
        for (i, profile) in self.profiles.iter().enumerate() {
            if let Profile::Motion(p) = profile {
                f(p, self.is_default(i));
                count += 1;
            }
        }
        count
    }
}

#[derive(Debug, Clone)]
struct StreamGroup {
    name: String,
    streams: Vec<Stream>,
}

/// Stream groups of one device, in discovery order
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    groups: Vec<StreamGroup>,
    unique_ids: HashSet<i16>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_video_profile(
        &mut self,
        group_name: &str,
        profile: VideoProfile,
        is_default: bool,
    ) -> Result<()> {
        self.add_profile(group_name, Profile::Video(profile), is_default)
    }

    pub fn add_motion_profile(
        &mut self,
        group_name: &str,
        profile: MotionProfile,
        is_default: bool,
    ) -> Result<()> {
        self.add_profile(group_name, Profile::Motion(profile), is_default)
    }

    /// Append a profile to the stream it belongs to, creating group and stream on first use
    pub fn add_profile(&mut self, group_name: &str, profile: Profile, is_default: bool) -> Result<()> {
        let uid = profile.unique_id();
        if !self.unique_ids.insert(uid) {
            return Err(CatalogError::DuplicateUniqueId(uid));
        }

        let group_idx = match self.groups.iter().position(|g| g.name == group_name) {
            Some(i) => i,
            None => {
                self.groups.push(StreamGroup {
                    name: group_name.to_string(),
                    streams: Vec::new(),
                });
                self.groups.len() - 1
            }
        };
        let group = &mut self.groups[group_idx];

        let stream_type = profile.stream_type();
        let stream_idx = match group.streams.iter().position(|s| s.stream_type == stream_type) {
            Some(i) => i,
            None => {
                group.streams.push(Stream::new(group_name, stream_type));
                group.streams.len() - 1
            }
        };

        group.streams[stream_idx].push(profile, is_default);
        Ok(())
    }

    pub fn num_of_streams(&self) -> usize {
        self.groups.iter().map(|g| g.streams.len()).sum()
    }

    pub fn num_of_stream_groups(&self) -> usize {
        self.groups.len()
    }

    pub fn num_of_profiles(&self) -> usize {
        self.unique_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn streams(&self) -> impl Iterator<Item = &Stream> {
        self.groups.iter().flat_map(|g| g.streams.iter())
    }

    pub fn foreach_stream_group(&self, mut f: impl FnMut(&str)) -> usize {
        for group in &self.groups {
            f(&group.name);
        }
        self.groups.len()
    }

    pub fn foreach_video_profile(&self, mut f: impl FnMut(&VideoProfile, bool)) -> usize {
        self.streams().map(|s| s.foreach_video(&mut f)).sum()
    }

    pub fn foreach_motion_profile(&self, mut f: impl FnMut(&MotionProfile, bool)) -> usize {
        self.streams().map(|s| s.foreach_motion(&mut f)).sum()
    }

    pub fn foreach_video_profile_in_group(
        &self,
        group_name: &str,
        mut f: impl FnMut(&VideoProfile, bool),
    ) -> usize {
        self.group(group_name)
            .map(|g| g.streams.iter().map(|s| s.foreach_video(&mut f)).sum::<usize>())
            .unwrap_or(0)
    }

    pub fn foreach_motion_profile_in_group(
        &self,
        group_name: &str,
        mut f: impl FnMut(&MotionProfile, bool),
    ) -> usize {
        self.group(group_name)
            .map(|g| g.streams.iter().map(|s| s.foreach_motion(&mut f)).sum::<usize>())
            .unwrap_or(0)
    }

    /// Look up the catalog profile matching the requested configuration
    pub fn resolve(&self, requested: &Profile) -> Option<&Profile> {
        let uid = requested.unique_id();
        if !self.unique_ids.contains(&uid) {
            return None;
        }
        self.streams()
            .flat_map(|s| s.profiles.iter())
            .find(|p| p.unique_id() == uid)
            .filter(|p| p.same_configuration(requested))
    }

    fn group(&self, name: &str) -> Option<&StreamGroup> {
        self.groups.iter().find(|g| g.name == name)
    }
}
