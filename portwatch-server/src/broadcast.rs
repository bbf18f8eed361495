//! Proximity broadcaster.
//!
//! Runs a proximity pass on a fixed interval and whenever a store write
//! asks for one. Passes never overlap. Each pass takes one fleet snapshot,
//! builds one frame per distinct subscription and hands it to every
//! matching connection without waiting on any of them.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use portwatch_core::protocol::ServerMessage;
use portwatch_core::proximity::{find_connections, SearchRadius};
use portwatch_core::{ProtocolError, Vessel, VesselId};
use tokio::sync::{Mutex, Notify};
use tokio::time::MissedTickBehavior;
use tokio_graceful_shutdown::SubsystemHandle;

use crate::registry::{ConnectionId, Delivery, Frame, SubscriberRegistry, Subscription};
use crate::store::{FleetSnapshot, FleetStore};
use crate::now_ms;

/// Counters from one pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    pub subscribers: usize,
    pub frames: usize,
    pub queued: usize,
    pub dropped: usize,
    pub removed: usize,
}

impl PassReport {
    fn count(&mut self, delivery: Delivery) {
        match delivery {
            Delivery::Queued => self.queued += 1,
            Delivery::Dropped => self.dropped += 1,
            Delivery::Removed => self.removed += 1,
        }
    }
}

/// Build the `vessel_update` frame for one subscription.
///
/// With `all_vessels` every vessel in the snapshot is included, otherwise
/// only vessels that appear in at least one connection.
pub fn build_frame(
    snapshot: &FleetSnapshot,
    radius: SearchRadius,
    all_vessels: bool,
    timestamp: u64,
) -> Result<Frame, ProtocolError> {
    let connections = find_connections(&snapshot.vessels, &snapshot.ports, radius);

    let vessels: Vec<Vessel> = if all_vessels {
        snapshot.vessels.clone()
    } else {
        let connected: BTreeSet<VesselId> = connections.iter().map(|c| c.vessel_id).collect();
        snapshot
            .vessels
            .iter()
            .filter(|v| connected.contains(&v.id))
            .cloned()
            .collect()
    };

    let json = ServerMessage::vessel_update(vessels, connections, timestamp).to_json()?;
    Ok(Frame::from(json))
}

// Frames are shared by subscriptions with the same radius and vessel scope
type FrameKey = (u64, bool);

fn frame_key(radius: SearchRadius, all_vessels: bool) -> FrameKey {
    (radius.km().to_bits(), all_vessels)
}

pub struct ProximityBroadcaster {
    store: Arc<dyn FleetStore>,
    registry: Arc<SubscriberRegistry>,
    default_radius: SearchRadius,
    tick_interval: Duration,
    /// Held for the whole of a pass
    pass: Mutex<()>,
    trigger: Notify,
}

impl ProximityBroadcaster {
    pub fn new(
        store: Arc<dyn FleetStore>,
        registry: Arc<SubscriberRegistry>,
        default_radius: SearchRadius,
        tick_interval: Duration,
    ) -> Self {
        ProximityBroadcaster {
            store,
            registry,
            default_radius,
            tick_interval,
            pass: Mutex::new(()),
            trigger: Notify::new(),
        }
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// Ask for a pass as soon as the current one (if any) finishes
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// Compute and fan out one round of updates
    pub async fn run_pass(&self) -> Result<PassReport, ProtocolError> {
        let _guard = self.pass.lock().await;

        let subscribers = self.registry.active().await;
        let mut report = PassReport {
            subscribers: subscribers.len(),
            ..Default::default()
        };
        if subscribers.is_empty() {
            return Ok(report);
        }

        let snapshot = self.store.snapshot().await;
        let timestamp = now_ms();
        let mut frames: HashMap<FrameKey, Frame> = HashMap::new();

        for (id, subscription) in subscribers {
            let Some(radius) = subscription.radius else {
                continue;
            };
            let key = frame_key(radius, subscription.wants_all_vessels);
            let frame = match frames.get(&key) {
                Some(frame) => frame.clone(),
                None => {
                    let frame = build_frame(&snapshot, radius, subscription.wants_all_vessels, timestamp)?;
                    frames.insert(key, frame.clone());
                    frame
                }
            };
            report.count(self.registry.deliver(id, frame).await);
        }
        report.frames = frames.len();

        log::trace!("Proximity pass: {:?}", report);
        if report.dropped > 0 {
            log::debug!("{} slow connections skipped this pass", report.dropped);
        }
        Ok(report)
    }

    /// Send the current state to one connection right away.
    ///
    /// Unlike periodic frames the snapshot is not dropped when a frame is
    /// still pending; it waits up to `wait` for the connection to drain.
    pub async fn send_snapshot(
        &self,
        id: ConnectionId,
        wait: Duration,
    ) -> Result<Delivery, ProtocolError> {
        let Some(subscription) = self.registry.subscription(id).await else {
            return Ok(Delivery::Removed);
        };
        let Subscription {
            radius,
            wants_all_vessels,
        } = subscription;

        let snapshot = self.store.snapshot().await;
        let frame = build_frame(
            &snapshot,
            radius.unwrap_or(self.default_radius),
            wants_all_vessels,
            now_ms(),
        )?;
        Ok(self.registry.reply(id, frame, wait).await)
    }

    pub async fn run(self: Arc<Self>, subsys: SubsystemHandle) -> Result<()> {
        log::info!(
            "Broadcasting proximity every {} s",
            self.tick_interval.as_secs_f64()
        );

        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = subsys.on_shutdown_requested() => {
                    log::debug!("Broadcaster shutdown");
                    self.registry.shutdown().await;
                    return Ok(());
                },
                _ = interval.tick() => {},
                _ = self.trigger.notified() => {
                    log::trace!("On-demand proximity pass");
                },
            }

            if let Err(e) = self.run_pass().await {
                log::warn!("Proximity pass failed: {}", e);
            }
        }
    }
}
