//! Seam between devices and the pub/sub transport.
//!
//! Devices call `Participant` instead of a transport session directly, so the
//! lifecycle can be driven by an in-memory participant in tests.

use crate::notification::Notification;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParticipantError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error on {topic}: {reason}")]
    Decode { topic: String, reason: String },
}

pub type Result<T> = std::result::Result<T, ParticipantError>;

/// Stream of notifications read from one topic
#[async_trait]
pub trait NotificationReader: Send {
    /// Next message, or `None` once the topic has been closed
    async fn recv(&mut self) -> Result<Option<Notification>>;
}

/// A member of the mesh able to open readers on device topics
#[async_trait]
pub trait Participant: Send + Sync + 'static {
    /// Human-readable participant name, used in logs
    fn name(&self) -> &str;

    /// Open a reader on the given notification topic
    async fn notification_reader(&self, topic: &str) -> Result<Box<dyn NotificationReader>>;
}

/// In-memory participant with scripted notification topics.
pub mod mock {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, MutexGuard, PoisonError};
    use tokio::sync::mpsc;

    fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
        m.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[derive(Debug, Clone)]
    struct Script {
        messages: Vec<Notification>,
        hold_open: bool,
    }

    #[derive(Default)]
    pub struct MockParticipant {
        scripts: Mutex<HashMap<String, Script>>,
        failing: Mutex<HashSet<String>>,
        // Senders kept alive for topics that never close
        held: Mutex<Vec<mpsc::UnboundedSender<Notification>>>,
        readers_opened: AtomicUsize,
    }

    impl MockParticipant {
        pub fn new() -> Self {
            Self::default()
        }

        /// Topic delivers `messages` and then closes
        pub fn script(&self, topic: &str, messages: Vec<Notification>) {
            self.insert(topic, messages, false);
        }

        /// Topic delivers `messages` and then stays silent without closing
        pub fn script_open(&self, topic: &str, messages: Vec<Notification>) {
            self.insert(topic, messages, true);
        }

        /// Opening a reader on `topic` fails with a transport error
        pub fn fail(&self, topic: &str) {
            lock(&self.failing).insert(topic.to_string());
        }

        pub fn readers_opened(&self) -> usize {
            self.readers_opened.load(Ordering::SeqCst)
        }

        fn insert(&self, topic: &str, messages: Vec<Notification>, hold_open: bool) {
            lock(&self.failing).remove(topic);
            lock(&self.scripts).insert(
                topic.to_string(),
                Script {
                    messages,
                    hold_open,
                },
            );
        }
    }

    struct MockReader {
        rx: mpsc::UnboundedReceiver<Notification>,
    }

    #[async_trait]
    impl NotificationReader for MockReader {
        async fn recv(&mut self) -> Result<Option<Notification>> {
            Ok(self.rx.recv().await)
        }
    }

    #[async_trait]
    impl Participant for MockParticipant {
        fn name(&self) -> &str {
            "mock"
        }

        async fn notification_reader(&self, topic: &str) -> Result<Box<dyn NotificationReader>> {
            self.readers_opened.fetch_add(1, Ordering::SeqCst);

            if lock(&self.failing).contains(topic) {
                return Err(ParticipantError::Transport(format!(
                    "mock: cannot subscribe to {}",
                    topic
                )));
            }

            let script = lock(&self.scripts)
                .get(topic)
                .cloned()
                .unwrap_or(Script {
                    messages: Vec::new(),
                    hold_open: true,
                });

            let (tx, rx) = mpsc::unbounded_channel();
            for message in script.messages {
                tx.send(message).ok();
            }
            if script.hold_open {
                lock(&self.held).push(tx);
            }

            Ok(Box::new(MockReader { rx }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockParticipant;
    use super::*;
    use crate::notification::DeviceHeader;
    use std::time::Duration;

    #[tokio::test]
    async fn test_scripted_topic_closes_after_messages() {
        let participant = MockParticipant::new();
        participant.script(
            "a/notification",
            vec![Notification::DeviceHeader(DeviceHeader { num_of_streams: 0 })],
        );

        let mut reader = participant.notification_reader("a/notification").await.unwrap();
        assert!(matches!(
            reader.recv().await.unwrap(),
            Some(Notification::DeviceHeader(_))
        ));
        assert!(reader.recv().await.unwrap().is_none());
        assert_eq!(participant.readers_opened(), 1);
    }

    #[tokio::test]
    async fn test_unscripted_topic_stays_silent() {
        let participant = MockParticipant::new();
        let mut reader = participant.notification_reader("b/notification").await.unwrap();
        let waited = tokio::time::timeout(Duration::from_millis(20), reader.recv()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn test_failing_topic() {
        let participant = MockParticipant::new();
        participant.fail("c/notification");
        assert!(matches!(
            participant.notification_reader("c/notification").await,
            Err(ParticipantError::Transport(_))
        ));
    }
}
