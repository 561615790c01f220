//! Zenoh transport adapter
//!
//! Carries JSON mirrors of the in-memory records over Zenoh:
//!
//! - `realsense/device-info/<guid>`: put announces a device (`DeviceInfo`),
//!   delete withdraws it
//! - `<topic_root>/notification`: device header and profile batches
//!
//! Every key is placed under `domain/<n>/` when a non-zero domain is configured.

use crate::device::info::DeviceInfo;
use crate::notification::Notification;
use crate::participant::{NotificationReader, Participant, ParticipantError, Result};
use crate::watcher::DiscoveryEvent;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use zenoh::handlers::FifoChannelHandler;
use zenoh::pubsub::Subscriber;
use zenoh::sample::{Sample, SampleKind};
use zenoh::Session;

/// How long to wait for replies when fetching already-published state
const QUERY_TIMEOUT: Duration = Duration::from_secs(2);

/// Key expressions used on the mesh
pub mod keys {
    use crate::guid::Guid;

    /// Prefix of device announcements
    pub const DEVICE_INFO: &str = "realsense/device-info";

    /// Apply the optional domain prefix to a key
    pub fn scoped(prefix: Option<&str>, key: &str) -> String {
        match prefix {
            Some(p) => format!("{}/{}", p, key),
            None => key.to_string(),
        }
    }

    /// Key matching every device announcement
    pub fn device_info_wildcard(prefix: Option<&str>) -> String {
        scoped(prefix, &format!("{}/*", DEVICE_INFO))
    }

    /// Extract the GUID from an announcement key
    pub fn guid_from_key(key: &str) -> Option<Guid> {
        let (head, last) = key.rsplit_once('/')?;
        if !head.ends_with(DEVICE_INFO) {
            return None;
        }
        last.parse().ok()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Key {0} does not name a device announcement")]
    InvalidKey(String),

    #[error("Invalid announcement payload on {key}: {reason}")]
    InvalidPayload { key: String, reason: String },
}

/// Convert an announcement sample into a discovery event
pub fn discovery_event(
    key: &str,
    kind: SampleKind,
    payload: &[u8],
) -> std::result::Result<DiscoveryEvent, DiscoveryError> {
    let guid = keys::guid_from_key(key).ok_or_else(|| DiscoveryError::InvalidKey(key.to_string()))?;
    match kind {
        SampleKind::Delete => Ok(DiscoveryEvent::Removed { guid }),
        SampleKind::Put => {
            let info: DeviceInfo =
                serde_json::from_slice(payload).map_err(|e| DiscoveryError::InvalidPayload {
                    key: key.to_string(),
                    reason: e.to_string(),
                })?;
            Ok(DiscoveryEvent::Added { guid, info })
        }
    }
}

/// Create a Zenoh session connected to `endpoint` in peer mode
pub async fn create_session(endpoint: &str) -> std::result::Result<Arc<Session>, zenoh::Error> {
    let mut config = zenoh::Config::default();

    config.insert_json5("mode", "\"peer\"").ok();

    log::info!("Connecting to Zenoh router at: {}", endpoint);

    config
        .insert_json5("connect/endpoints", &format!("[\"{}\"]", endpoint))
        .ok();

    // Only talk to the configured router
    config
        .insert_json5("scouting/multicast/enabled", "false")
        .ok();
    config.insert_json5("scouting/gossip/enabled", "false").ok();

    let session = zenoh::open(config).await?;

    Ok(Arc::new(session))
}

/// Participant backed by a Zenoh session
pub struct ZenohParticipant {
    session: Arc<Session>,
    key_prefix: Option<String>,
    name: String,
}

impl ZenohParticipant {
    pub fn new(session: Arc<Session>, key_prefix: Option<String>, name: impl Into<String>) -> Self {
        Self {
            session,
            key_prefix,
            name: name.into(),
        }
    }

    /// Fetch samples already published under `key` from queryables on the mesh
    async fn fetch(&self, key: &str) -> Vec<Sample> {
        let mut samples = Vec::new();
        match self.session.get(key).timeout(QUERY_TIMEOUT).await {
            Ok(replies) => {
                while let Ok(reply) = replies.recv_async().await {
                    match reply.result() {
                        Ok(sample) => samples.push(sample.clone()),
                        Err(e) => log::debug!("Error reply on {}: {:?}", key, e),
                    }
                }
            }
            Err(e) => log::debug!("Query on {} failed: {}", key, e),
        }
        samples
    }

    /// Forward device announcements to `tx` until shutdown.
    ///
    /// Announcements already on the mesh are fetched first, then live samples follow.
    pub async fn run_discovery(
        &self,
        tx: mpsc::Sender<DiscoveryEvent>,
        mut shutdown: watch::Receiver<()>,
    ) -> std::result::Result<(), zenoh::Error> {
        let key = keys::device_info_wildcard(self.key_prefix.as_deref());
        let subscriber = self.session.declare_subscriber(&key).await?;
        log::info!("Watching device announcements on {}", key);

        for sample in self.fetch(&key).await {
            if !Self::forward(&sample, &tx).await {
                return Ok(());
            }
        }

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                result = subscriber.recv_async() => {
                    match result {
                        Ok(sample) => {
                            if !Self::forward(&sample, &tx).await {
                                break;
                            }
                        }
                        Err(e) => {
                            log::warn!("Discovery subscriber error: {}", e);
                            break;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    // Returns false once the receiving side is gone
    async fn forward(sample: &Sample, tx: &mpsc::Sender<DiscoveryEvent>) -> bool {
        let key = sample.key_expr().as_str();
        match discovery_event(key, sample.kind(), &sample.payload().to_bytes()) {
            Ok(event) => tx.send(event).await.is_ok(),
            Err(e) => {
                log::warn!("Ignoring discovery sample: {}", e);
                true
            }
        }
    }
}

/// Payloads delivered from the fetched backlog.
///
/// A sample published between subscribing and fetching reaches the reader
/// twice. Each fetched payload suppresses one live copy of itself.
#[derive(Debug, Default)]
struct FetchedPayloads(HashMap<Vec<u8>, usize>);

impl FetchedPayloads {
    fn record(&mut self, payload: Vec<u8>) {
        *self.0.entry(payload).or_default() += 1;
    }

    /// True when `payload` was already delivered from the backlog
    fn take(&mut self, payload: &[u8]) -> bool {
        let Some(count) = self.0.get_mut(payload) else {
            return false;
        };
        *count -= 1;
        if *count == 0 {
            self.0.remove(payload);
        }
        true
    }
}

struct ZenohReader {
    topic: String,
    backlog: VecDeque<Sample>,
    fetched: FetchedPayloads,
    subscriber: Subscriber<FifoChannelHandler<Sample>>,
}

impl ZenohReader {
    fn new(
        topic: String,
        backlog: Vec<Sample>,
        subscriber: Subscriber<FifoChannelHandler<Sample>>,
    ) -> Self {
        let mut fetched = FetchedPayloads::default();
        for sample in backlog.iter().filter(|s| s.kind() == SampleKind::Put) {
            fetched.record(sample.payload().to_bytes().into_owned());
        }
        Self {
            topic,
            backlog: backlog.into(),
            fetched,
            subscriber,
        }
    }

    async fn next_sample(&mut self) -> Result<Sample> {
        if let Some(sample) = self.backlog.pop_front() {
            return Ok(sample);
        }
        loop {
            let sample = self
                .subscriber
                .recv_async()
                .await
                .map_err(|e| ParticipantError::Transport(e.to_string()))?;
            if sample.kind() == SampleKind::Put && self.fetched.take(&sample.payload().to_bytes()) {
                log::debug!("Dropping live copy of a fetched sample on {}", self.topic);
                continue;
            }
            return Ok(sample);
        }
    }

    // Some(None) for a withdrawn topic, None for an undecodable sample
    fn decode(&self, sample: &Sample) -> Option<Option<Notification>> {
        if sample.kind() == SampleKind::Delete {
            return Some(None);
        }
        match serde_json::from_slice(&sample.payload().to_bytes()) {
            Ok(notification) => Some(Some(notification)),
            Err(e) => {
                log::warn!(
                    "{}",
                    ParticipantError::Decode {
                        topic: self.topic.clone(),
                        reason: e.to_string(),
                    }
                );
                None
            }
        }
    }
}

#[async_trait]
impl NotificationReader for ZenohReader {
    async fn recv(&mut self) -> Result<Option<Notification>> {
        loop {
            let sample = self.next_sample().await?;
            if let Some(decoded) = self.decode(&sample) {
                return Ok(decoded);
            }
        }
    }
}

#[async_trait]
impl Participant for ZenohParticipant {
    fn name(&self) -> &str {
        &self.name
    }

    async fn notification_reader(&self, topic: &str) -> Result<Box<dyn NotificationReader>> {
        let key = keys::scoped(self.key_prefix.as_deref(), topic);
        // Subscribe before fetching so nothing published in between is lost
        let subscriber = self
            .session
            .declare_subscriber(&key)
            .await
            .map_err(|e| ParticipantError::Transport(e.to_string()))?;
        let backlog = self.fetch(&key).await;
        log::debug!("Reader on {} starts with {} stored samples", key, backlog.len());

        Ok(Box::new(ZenohReader::new(key, backlog, subscriber)))
    }
}
