//! Stream activation state of a running device.

use crate::device::catalog::{Catalog, Profile};
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("Device is not running")]
    DeviceNotRunning,

    #[error("Profile {0} is not in the device catalog")]
    InvalidProfile(i16),
}

/// Effect of a successful open or close entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamChange {
    Started,
    AlreadyActive,
    Stopped,
    NotActive,
}

/// Outcome for one requested stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamReport {
    pub unique_id: i16,
    pub outcome: Result<StreamChange, StreamError>,
}

impl StreamReport {
    fn new(unique_id: i16, outcome: Result<StreamChange, StreamError>) -> Self {
        Self { unique_id, outcome }
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Activation change observed by stream consumers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Opened(Profile),
    Closed(i16),
}

/// Active streams keyed by unique id, with an observer channel
pub(crate) struct StreamControl {
    active: Mutex<BTreeMap<i16, Profile>>,
    event_tx: broadcast::Sender<StreamEvent>,
}

impl StreamControl {
    pub(crate) fn new(capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            active: Mutex::new(BTreeMap::new()),
            event_tx,
        }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.event_tx.subscribe()
    }

    pub(crate) async fn active(&self) -> Vec<i16> {
        self.active.lock().await.keys().copied().collect()
    }

    pub(crate) async fn open(
        &self,
        catalog: Option<&Catalog>,
        requested: &[Profile],
    ) -> Vec<StreamReport> {
        let Some(catalog) = catalog else {
            return requested
                .iter()
                .map(|p| StreamReport::new(p.unique_id(), Err(StreamError::DeviceNotRunning)))
                .collect();
        };

        let mut active = self.active.lock().await;
        requested
            .iter()
            .map(|request| {
                let uid = request.unique_id();
                let Some(profile) = catalog.resolve(request) else {
                    log::debug!("Rejecting open of unknown profile {}", uid);
                    return StreamReport::new(uid, Err(StreamError::InvalidProfile(uid)));
                };
                if active.contains_key(&uid) {
                    return StreamReport::new(uid, Ok(StreamChange::AlreadyActive));
                }
                active.insert(uid, profile.clone());
                log::debug!("Stream {} opened", uid);
                self.event_tx.send(StreamEvent::Opened(profile.clone())).ok();
                StreamReport::new(uid, Ok(StreamChange::Started))
            })
            .collect()
    }

    // `None` catalog: the device is not running and nothing can be closed
    pub(crate) async fn close(&self, catalog: Option<&Catalog>, uids: &[i16]) -> Vec<StreamReport> {
        if catalog.is_none() {
            return uids
                .iter()
                .map(|&uid| StreamReport::new(uid, Err(StreamError::DeviceNotRunning)))
                .collect();
        }

        let mut active = self.active.lock().await;
        uids.iter()
            .map(|&uid| {
                if active.remove(&uid).is_some() {
                    log::debug!("Stream {} closed", uid);
                    self.event_tx.send(StreamEvent::Closed(uid)).ok();
                    StreamReport::new(uid, Ok(StreamChange::Stopped))
                } else {
                    StreamReport::new(uid, Ok(StreamChange::NotActive))
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::catalog::{Format, StreamType, VideoProfile};

    fn color(uid: i16) -> VideoProfile {
        VideoProfile {
            stream_index: 0,
            unique_id: uid,
            fps: 30,
            format: Format::Rgb8,
            stream_type: StreamType::Color,
            width: 1280,
            height: 720,
            is_default: uid == 1,
        }
    }

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog.add_video_profile("RGB Camera", color(1), true).unwrap();
        catalog.add_video_profile("RGB Camera", color(2), false).unwrap();
        catalog
    }

    #[tokio::test]
    async fn test_open_reports_per_entry() {
        let control = StreamControl::new(8);
        let catalog = catalog();
        let reports = control
            .open(
                Some(&catalog),
                &[Profile::Video(color(1)), Profile::Video(color(42))],
            )
            .await;

        assert_eq!(reports[0], StreamReport::new(1, Ok(StreamChange::Started)));
        assert_eq!(
            reports[1],
            StreamReport::new(42, Err(StreamError::InvalidProfile(42)))
        );
        assert_eq!(control.active().await, vec![1]);
    }

    #[tokio::test]
    async fn test_open_coalesces_active_streams() {
        let control = StreamControl::new(8);
        let catalog = catalog();
        let mut events = control.subscribe();

        control.open(Some(&catalog), &[Profile::Video(color(2))]).await;
        let reports = control
            .open(
                Some(&catalog),
                &[Profile::Video(color(2)), Profile::Video(color(2))],
            )
            .await;

        assert!(reports
            .iter()
            .all(|r| r.outcome == Ok(StreamChange::AlreadyActive)));
        assert_eq!(
            events.try_recv().unwrap(),
            StreamEvent::Opened(Profile::Video(color(2)))
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_close_inactive_is_noop() {
        let control = StreamControl::new(8);
        let catalog = catalog();
        let mut events = control.subscribe();

        let reports = control.close(Some(&catalog), &[1]).await;
        assert_eq!(reports, vec![StreamReport::new(1, Ok(StreamChange::NotActive))]);
        assert!(events.try_recv().is_err());

        control.open(Some(&catalog), &[Profile::Video(color(1))]).await;
        let reports = control.close(Some(&catalog), &[1, 1]).await;
        assert_eq!(reports[0].outcome, Ok(StreamChange::Stopped));
        assert_eq!(reports[1].outcome, Ok(StreamChange::NotActive));
        assert!(control.active().await.is_empty());
    }

    #[tokio::test]
    async fn test_not_running_rejects_everything() {
        let control = StreamControl::new(8);
        let opened = control.open(None, &[Profile::Video(color(1))]).await;
        assert_eq!(opened[0].outcome, Err(StreamError::DeviceNotRunning));
        let closed = control.close(None, &[1]).await;
        assert_eq!(closed[0].outcome, Err(StreamError::DeviceNotRunning));
    }
}
