//! devmesh - watch camera devices announced on the mesh
//!
//! Usage:
//!   devmesh                              # Watch with defaults
//!   devmesh -c devmesh.yaml              # Load settings from YAML
//!   devmesh -e tcp/10.0.0.2:7447         # Connect to a specific router
//!   devmesh --debug                      # Verbose logging

use anyhow::Context;
use argh::FromArgs;
use devmesh::config::MeshConfig;
use devmesh::zenoh_participant::{create_session, ZenohParticipant};
use devmesh::{DeviceEvent, DeviceRegistry, DeviceWatcher};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};

/// devmesh - directory of camera devices announced over Zenoh
#[derive(FromArgs)]
struct Args {
    /// show version information
    #[argh(switch, short = 'V')]
    version: bool,

    /// path to a YAML configuration file
    #[argh(option, short = 'c')]
    config: Option<String>,

    /// zenoh router endpoint (overrides config and DEVMESH_ZENOH_ENDPOINT)
    #[argh(option, short = 'e')]
    endpoint: Option<String>,

    /// mesh domain id (0-232, overrides config)
    #[argh(option, short = 'd')]
    domain: Option<u32>,

    /// enable debug logging
    #[argh(switch)]
    debug: bool,
}

async fn log_events(registry: Arc<DeviceRegistry>, mut rx: broadcast::Receiver<DeviceEvent>) {
    loop {
        match rx.recv().await {
            Ok(DeviceEvent::Ready(guid)) => {
                let Some(device) = registry.find(&guid).await else {
                    continue;
                };
                log::info!(
                    "Device '{}' ready at {}",
                    device.device_info().name,
                    device.topic_root()
                );
                device.foreach_stream_group(|group| {
                    let video = device.foreach_video_profile_in_group(group, |_, _| {});
                    let motion = device.foreach_motion_profile_in_group(group, |_, _| {});
                    log::info!(
                        "  - {} ({} video, {} motion profiles)",
                        group,
                        video,
                        motion
                    );
                });
            }
            Ok(event) => log::info!("{:?}", event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                log::warn!("Device event log lagged by {} events", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();

    if args.version {
        println!("devmesh {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let default_filter = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .target(env_logger::Target::Stderr)
        .init();

    let mut config = match &args.config {
        Some(path) => MeshConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path))?,
        None => MeshConfig::default(),
    };
    if let Some(domain) = args.domain {
        config.domain = domain;
    }
    config.validate()?;

    log::info!("Starting devmesh (domain {})...", config.domain);

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    ctrlc::set_handler({
        let shutdown_tx = shutdown_tx.clone();
        move || {
            log::info!("Received Ctrl+C, shutting down gracefully...");
            shutdown_tx.send(()).ok();
        }
    })?;

    let endpoint = config.resolve_endpoint(args.endpoint.as_deref());
    let session = create_session(&endpoint)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open Zenoh session: {}", e))?;

    let participant = Arc::new(ZenohParticipant::new(
        session,
        config.key_prefix(),
        "devmesh",
    ));
    let registry = Arc::new(DeviceRegistry::with_options(config.device_options()));
    let watcher = DeviceWatcher::new(registry.clone(), participant.clone(), config.event_capacity);
    let log_task = tokio::spawn(log_events(registry.clone(), watcher.subscribe()));

    let (discovery_tx, discovery_rx) = mpsc::channel(config.event_capacity);
    let discovery_shutdown = shutdown_rx.clone();
    let discovery_task = tokio::spawn(async move {
        if let Err(e) = participant
            .run_discovery(discovery_tx, discovery_shutdown)
            .await
        {
            log::error!("Discovery error: {}", e);
        }
    });

    log::info!("devmesh running. Press Ctrl+C to exit.");
    watcher.run(discovery_rx, shutdown_rx).await;

    discovery_task.abort();
    log_task.abort();

    log::info!("devmesh stopped.");
    Ok(())
}
