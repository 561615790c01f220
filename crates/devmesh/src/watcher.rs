//! Device watcher
//!
//! Turns discovery notifications into registry entries and drives each new
//! device to `Running` on a background task, so one slow enumeration never
//! holds up discovery of the others.

use crate::device::info::DeviceInfo;
use crate::guid::Guid;
use crate::participant::Participant;
use crate::registry::DeviceRegistry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::{AbortHandle, JoinSet};

/// Input from the discovery layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    Added { guid: Guid, info: DeviceInfo },
    Removed { guid: Guid },
}

/// Lifecycle changes published by the watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Discovered(Guid),
    Ready(Guid),
    EnumerationFailed { guid: Guid, reason: String },
    Rejected { guid: Guid, reason: String },
    Removed(Guid),
}

pub struct DeviceWatcher {
    registry: Arc<DeviceRegistry>,
    participant: Arc<dyn Participant>,
    event_tx: broadcast::Sender<DeviceEvent>,
    tasks: JoinSet<Guid>,
    // Devices with an enumeration task in flight
    enumerating: HashMap<Guid, AbortHandle>,
}

impl DeviceWatcher {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        participant: Arc<dyn Participant>,
        event_capacity: usize,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(event_capacity.max(1));
        Self {
            registry,
            participant,
            event_tx,
            tasks: JoinSet::new(),
            enumerating: HashMap::new(),
        }
    }

    /// Subscribe to device lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.event_tx.subscribe()
    }

    /// Apply one discovery event
    pub async fn handle(&mut self, event: DiscoveryEvent) {
        match event {
            DiscoveryEvent::Added { guid, info } => self.on_added(guid, info).await,
            DiscoveryEvent::Removed { guid } => {
                if let Some(task) = self.enumerating.remove(&guid) {
                    log::debug!("Cancelling enumeration of removed device {}", guid);
                    task.abort();
                }
                if self.registry.remove(&guid).await.is_some() {
                    self.emit(DeviceEvent::Removed(guid));
                } else {
                    log::debug!("Removal for unknown device {}", guid);
                }
            }
        }
    }

    async fn on_added(&mut self, guid: Guid, info: DeviceInfo) {
        let known = self.registry.find(&guid).await.is_some();
        let device = match self
            .registry
            .create(self.participant.clone(), guid, info)
            .await
        {
            Ok(device) => device,
            Err(e) => {
                log::warn!("Rejected device announcement: {}", e);
                self.emit(DeviceEvent::Rejected {
                    guid,
                    reason: e.to_string(),
                });
                return;
            }
        };

        if !known {
            self.emit(DeviceEvent::Discovered(guid));
        }
        if device.is_running() {
            log::debug!("Device {} already running", guid);
            return;
        }
        self.reap_finished();
        if self.enumerating.contains_key(&guid) {
            log::debug!("Device {} already enumerating", guid);
            return;
        }

        // Enumeration happens outside the registry lock
        let event_tx = self.event_tx.clone();
        let task = self.tasks.spawn(async move {
            match device.run().await {
                Ok(()) => {
                    event_tx.send(DeviceEvent::Ready(guid)).ok();
                }
                Err(e) => {
                    event_tx
                        .send(DeviceEvent::EnumerationFailed {
                            guid,
                            reason: e.to_string(),
                        })
                        .ok();
                }
            }
            guid
        });
        self.enumerating.insert(guid, task);
    }

    fn reap_finished(&mut self) {
        while let Some(joined) = self.tasks.try_join_next() {
            match joined {
                Ok(guid) => {
                    self.enumerating.remove(&guid);
                }
                Err(e) => {
                    if e.is_panic() {
                        log::error!("Enumeration task panicked: {}", e);
                    }
                    self.enumerating.retain(|_, task| task.id() != e.id());
                }
            }
        }
    }

    fn emit(&self, event: DeviceEvent) {
        // No subscribers is fine
        self.event_tx.send(event).ok();
    }

    /// Process discovery events until the channel closes or shutdown is signalled.
    ///
    /// On exit, in-flight enumerations are aborted and the registry is cleared.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<DiscoveryEvent>,
        mut shutdown: watch::Receiver<()>,
    ) {
        log::info!("Device watcher started (participant: {})", self.participant.name());

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    log::info!("Device watcher shutting down...");
                    break;
                }

                event = events.recv() => {
                    match event {
                        Some(event) => self.handle(event).await,
                        None => {
                            log::info!("Discovery channel closed");
                            break;
                        }
                    }
                }
            }

            self.reap_finished();
        }

        self.tasks.abort_all();
        while self.tasks.join_next().await.is_some() {}
        self.enumerating.clear();
        self.registry.clear().await;
        log::info!("Device watcher stopped.");
    }
}
