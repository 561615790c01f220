//! Devices announced on the mesh.
//!
//! A device exists from the moment it is identified. It only becomes usable
//! once `run()` has enumerated its streams: before that the catalog is empty
//! and stream control rejects every request.

pub mod catalog;
pub mod control;
pub mod info;

use crate::guid::Guid;
use crate::notification::{
    notification_topic, MotionStreamProfiles, Notification, VideoStreamProfiles,
};
use crate::participant::{Participant, ParticipantError};
use catalog::{Catalog, CatalogError, MotionProfile, Profile, VideoProfile};
use control::{StreamControl, StreamEvent, StreamReport};
use info::DeviceInfo;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};

/// Default bound on a device enumeration (30 seconds)
pub const DEFAULT_ENUMERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default capacity of per-device event channels
pub const DEFAULT_EVENT_CAPACITY: usize = 100;

#[derive(Error, Debug)]
pub enum EnumerationError {
    #[error("Timed out after {after:?} on {topic} ({received} profiles received, {expected:?} expected)")]
    Timeout {
        topic: String,
        after: Duration,
        received: usize,
        expected: Option<usize>,
    },

    #[error("Notification topic {topic} closed before enumeration completed")]
    Disconnected { topic: String },

    #[error("Participant error: {0}")]
    Transport(#[from] ParticipantError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Enumeration failed for {guid}: {source}")]
    Enumeration {
        guid: Guid,
        #[source]
        source: EnumerationError,
    },
}

pub type Result<T> = std::result::Result<T, DeviceError>;

/// Lifecycle state of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Identity known, catalog empty
    Created,
    /// Catalog populated, queries and stream control enabled
    Running,
}

/// Tunables applied to every device a registry creates
#[derive(Debug, Clone)]
pub struct DeviceOptions {
    pub enumeration_timeout: Duration,
    pub event_capacity: usize,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            enumeration_timeout: DEFAULT_ENUMERATION_TIMEOUT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Enumeration progress, kept outside the timed future so a timeout can report it
#[derive(Default)]
struct Progress {
    expected: Option<usize>,
    received: usize,
    catalog: Catalog,
}

pub struct Device {
    guid: Guid,
    info: DeviceInfo,
    participant: Arc<dyn Participant>,
    options: DeviceOptions,
    /// Set exactly once, when enumeration succeeds
    catalog: OnceLock<Catalog>,
    /// Serializes concurrent `run()` calls
    run_lock: Mutex<()>,
    streams: StreamControl,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("guid", &self.guid)
            .field("info", &self.info)
            .field("participant", &self.participant.name())
            .field("state", &self.state())
            .finish()
    }
}

impl Device {
    pub(crate) fn new(
        participant: Arc<dyn Participant>,
        guid: Guid,
        info: DeviceInfo,
        options: DeviceOptions,
    ) -> Self {
        let streams = StreamControl::new(options.event_capacity);
        Self {
            guid,
            info,
            participant,
            options,
            catalog: OnceLock::new(),
            run_lock: Mutex::new(()),
            streams,
        }
    }

    /// GUID of the remote writer that declared this device
    pub fn guid(&self) -> Guid {
        self.guid
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn topic_root(&self) -> &str {
        &self.info.topic_root
    }

    pub fn state(&self) -> DeviceState {
        if self.is_running() {
            DeviceState::Running
        } else {
            DeviceState::Created
        }
    }

    pub fn is_running(&self) -> bool {
        self.catalog.get().is_some()
    }

    /// Make the device ready for use by enumerating its streams.
    ///
    /// This waits on the network and may take a while; call it from a
    /// background task. Returns immediately when already running. On failure
    /// the device stays in `Created` and `run()` may be called again.
    pub async fn run(&self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        let _guard = self.run_lock.lock().await;
        if self.is_running() {
            return Ok(());
        }

        let topic = notification_topic(&self.info.topic_root);
        log::info!(
            "Enumerating device '{}' ({}) on {}",
            self.info.name,
            self.guid,
            topic
        );

        let mut progress = Progress::default();
        let timeout = self.options.enumeration_timeout;
        let outcome = tokio::time::timeout(timeout, self.enumerate(&topic, &mut progress)).await;

        let result = match outcome {
            Ok(result) => result,
            Err(_) => Err(EnumerationError::Timeout {
                topic,
                after: timeout,
                received: progress.received,
                expected: progress.expected,
            }),
        };

        if let Err(source) = result {
            log::warn!("Device {} enumeration failed: {}", self.guid, source);
            return Err(DeviceError::Enumeration {
                guid: self.guid,
                source,
            });
        }

        let catalog = progress.catalog;
        log::info!(
            "Device '{}' ({}) running: {} stream groups, {} streams, {} profiles",
            self.info.name,
            self.guid,
            catalog.num_of_stream_groups(),
            catalog.num_of_streams(),
            catalog.num_of_profiles()
        );
        // Only this call can set it while holding run_lock
        self.catalog.set(catalog).ok();
        Ok(())
    }

    async fn enumerate(
        &self,
        topic: &str,
        progress: &mut Progress,
    ) -> std::result::Result<(), EnumerationError> {
        let mut reader = self.participant.notification_reader(topic).await?;

        loop {
            if let Some(expected) = progress.expected {
                if progress.received >= expected {
                    return Ok(());
                }
            }

            let message = reader
                .recv()
                .await?
                .ok_or_else(|| EnumerationError::Disconnected {
                    topic: topic.to_string(),
                })?;

            match message {
                Notification::DeviceHeader(header) => {
                    if progress.expected.is_some() {
                        log::warn!("Ignoring repeated device header on {}", topic);
                        continue;
                    }
                    log::debug!(
                        "Device header on {}: {} profiles expected",
                        topic,
                        header.num_of_streams
                    );
                    progress.expected = Some(header.num_of_streams);
                }
                Notification::VideoStreamProfiles(VideoStreamProfiles {
                    group_name,
                    profiles,
                }) => {
                    let expected = Self::expected(progress, topic)?;
                    for profile in profiles {
                        let is_default = profile.is_default;
                        progress
                            .catalog
                            .add_video_profile(&group_name, profile, is_default)?;
                        progress.received += 1;
                    }
                    Self::check_overflow(progress, expected)?;
                }
                Notification::MotionStreamProfiles(MotionStreamProfiles {
                    group_name,
                    profiles,
                }) => {
                    let expected = Self::expected(progress, topic)?;
                    for profile in profiles {
                        let is_default = profile.is_default;
                        progress
                            .catalog
                            .add_motion_profile(&group_name, profile, is_default)?;
                        progress.received += 1;
                    }
                    Self::check_overflow(progress, expected)?;
                }
            }
        }
    }

    fn expected(progress: &Progress, topic: &str) -> std::result::Result<usize, EnumerationError> {
        progress.expected.ok_or_else(|| {
            EnumerationError::Protocol(format!(
                "profiles received on {} before the device header",
                topic
            ))
        })
    }

    fn check_overflow(
        progress: &Progress,
        expected: usize,
    ) -> std::result::Result<(), EnumerationError> {
        if progress.received > expected {
            return Err(EnumerationError::Protocol(format!(
                "received {} profiles, device header announced {}",
                progress.received, expected
            )));
        }
        Ok(())
    }

    //----------- below this line, queries only report data once running

    /// The enumerated catalog, present only when running
    pub fn catalog(&self) -> Option<&Catalog> {
        self.catalog.get()
    }

    pub fn num_of_streams(&self) -> usize {
        self.catalog().map_or(0, Catalog::num_of_streams)
    }

    pub fn num_of_stream_groups(&self) -> usize {
        self.catalog().map_or(0, Catalog::num_of_stream_groups)
    }

    pub fn foreach_stream_group(&self, f: impl FnMut(&str)) -> usize {
        self.catalog().map_or(0, |c| c.foreach_stream_group(f))
    }

    pub fn foreach_video_profile(&self, f: impl FnMut(&VideoProfile, bool)) -> usize {
        self.catalog().map_or(0, |c| c.foreach_video_profile(f))
    }

    pub fn foreach_motion_profile(&self, f: impl FnMut(&MotionProfile, bool)) -> usize {
        self.catalog().map_or(0, |c| c.foreach_motion_profile(f))
    }

    pub fn foreach_video_profile_in_group(
        &self,
        group_name: &str,
        f: impl FnMut(&VideoProfile, bool),
    ) -> usize {
        self.catalog()
            .map_or(0, |c| c.foreach_video_profile_in_group(group_name, f))
    }

    pub fn foreach_motion_profile_in_group(
        &self,
        group_name: &str,
        f: impl FnMut(&MotionProfile, bool),
    ) -> usize {
        self.catalog()
            .map_or(0, |c| c.foreach_motion_profile_in_group(group_name, f))
    }

    /// Activate the requested profiles, reporting an outcome per entry
    pub async fn open(&self, profiles: &[Profile]) -> Vec<StreamReport> {
        self.streams.open(self.catalog(), profiles).await
    }

    /// Deactivate streams by unique id; ids that are not active are left alone.
    ///
    /// On a running device with no active streams every entry reports
    /// `NotActive`. A device that is not running has no stream state at all,
    /// so every entry reports `DeviceNotRunning`, the same as `open`.
    pub async fn close(&self, stream_uids: &[i16]) -> Vec<StreamReport> {
        self.streams.close(self.catalog(), stream_uids).await
    }

    /// Unique ids of the currently active streams
    pub async fn active_streams(&self) -> Vec<i16> {
        self.streams.active().await
    }

    /// Register for stream activation changes
    pub fn subscribe_streams(&self) -> broadcast::Receiver<StreamEvent> {
        self.streams.subscribe()
    }
}
