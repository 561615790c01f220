//! devmesh - directory of streaming camera devices announced over a pub/sub mesh
//!
//! Devices are registered as they are discovered, enumerated lazily in the
//! background, and then serve their stream catalog and stream control to
//! bridge components.

pub mod config;
pub mod device;
pub mod guid;
pub mod notification;
pub mod participant;
pub mod registry;
pub mod watcher;
pub mod zenoh_participant;

// Re-export commonly used types
pub use device::catalog::{Catalog, Format, MotionProfile, Profile, Stream, StreamType, VideoProfile};
pub use device::control::{StreamChange, StreamError, StreamEvent, StreamReport};
pub use device::info::{topic_root, DeviceInfo};
pub use device::{Device, DeviceError, DeviceOptions, DeviceState, EnumerationError};
pub use guid::Guid;
pub use participant::{NotificationReader, Participant};
pub use registry::{DeviceRegistry, RegistryError};
pub use watcher::{DeviceEvent, DeviceWatcher, DiscoveryEvent};
