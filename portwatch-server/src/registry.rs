//! Subscriber registry for the proximity stream.
//!
//! One registry belongs to one server instance. Each connection registers
//! and gets a bounded outbound channel of depth one plus a shutdown signal.
//! The broadcaster never waits on a connection: when the channel is full the
//! frame is dropped for that connection, and when the receiver is gone the
//! subscriber is removed. Replies to a client's own request wait, bounded,
//! for the pending frame to be written instead of being dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use portwatch_core::proximity::SearchRadius;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio::sync::{mpsc, watch, RwLock};

pub type ConnectionId = u64;

/// A serialized frame, shared by every subscriber that receives it
pub type Frame = Arc<str>;

/// What one connection asked for
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Subscription {
    /// `None` until configured, and again after a disable
    pub radius: Option<SearchRadius>,
    pub wants_all_vessels: bool,
}

/// Handed to the connection task on registration
#[derive(Debug)]
pub struct Registration {
    pub id: ConnectionId,
    pub frames: mpsc::Receiver<Frame>,
    /// Flips to `true` when the server shuts down
    pub shutdown: watch::Receiver<bool>,
}

/// Result of handing a frame to one subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// Previous frame not yet written; this one is lost
    Dropped,
    /// Connection is gone and has been unregistered
    Removed,
}

#[derive(Debug)]
struct Subscriber {
    tx: mpsc::Sender<Frame>,
    subscription: Subscription,
}

#[derive(Debug)]
pub struct SubscriberRegistry {
    next_id: AtomicU64,
    subscribers: RwLock<HashMap<ConnectionId, Subscriber>>,
    shutdown: watch::Sender<bool>,
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        SubscriberRegistry::new()
    }
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        SubscriberRegistry {
            next_id: AtomicU64::new(1),
            subscribers: RwLock::new(HashMap::new()),
            shutdown,
        }
    }

    pub async fn register(&self) -> Registration {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, frames) = mpsc::channel(1);
        self.subscribers.write().await.insert(
            id,
            Subscriber {
                tx,
                subscription: Subscription::default(),
            },
        );
        log::debug!("Connection {} registered", id);

        Registration {
            id,
            frames,
            shutdown: self.shutdown.subscribe(),
        }
    }

    pub async fn unregister(&self, id: ConnectionId) {
        if self.subscribers.write().await.remove(&id).is_some() {
            log::debug!("Connection {} unregistered", id);
        }
    }

    pub async fn len(&self) -> usize {
        self.subscribers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn subscription(&self, id: ConnectionId) -> Option<Subscription> {
        self.subscribers.read().await.get(&id).map(|s| s.subscription)
    }

    /// Replace the radius for `id`; the newest configuration always wins
    pub async fn configure(&self, id: ConnectionId, radius: SearchRadius) -> bool {
        self.update(id, |sub| sub.radius = Some(radius)).await
    }

    /// Stop periodic updates for `id` without closing the connection
    pub async fn disable(&self, id: ConnectionId) -> bool {
        self.update(id, |sub| *sub = Subscription::default()).await
    }

    pub async fn set_wants_all_vessels(&self, id: ConnectionId, wants_all_vessels: bool) -> bool {
        self.update(id, |sub| sub.wants_all_vessels = wants_all_vessels)
            .await
    }

    async fn update(&self, id: ConnectionId, f: impl FnOnce(&mut Subscription)) -> bool {
        match self.subscribers.write().await.get_mut(&id) {
            Some(subscriber) => {
                f(&mut subscriber.subscription);
                true
            }
            None => false,
        }
    }

    /// Connections with an enabled subscription
    pub async fn active(&self) -> Vec<(ConnectionId, Subscription)> {
        let mut active: Vec<_> = self
            .subscribers
            .read()
            .await
            .iter()
            .filter(|(_, s)| s.subscription.radius.is_some())
            .map(|(&id, s)| (id, s.subscription))
            .collect();
        active.sort_by_key(|(id, _)| *id);
        active
    }

    /// Queue `frame` for `id` without waiting
    pub async fn deliver(&self, id: ConnectionId, frame: Frame) -> Delivery {
        let result = match self.subscribers.read().await.get(&id) {
            Some(subscriber) => subscriber.tx.try_send(frame),
            None => return Delivery::Removed,
        };

        match result {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => {
                log::debug!("Connection {} is behind, frame dropped", id);
                Delivery::Dropped
            }
            Err(TrySendError::Closed(_)) => {
                self.unregister(id).await;
                Delivery::Removed
            }
        }
    }

    /// Queue a reply for `id`, waiting at most `wait` for room
    pub async fn reply(&self, id: ConnectionId, frame: Frame, wait: Duration) -> Delivery {
        let tx = match self.subscribers.read().await.get(&id) {
            Some(subscriber) => subscriber.tx.clone(),
            None => return Delivery::Removed,
        };

        match tx.send_timeout(frame, wait).await {
            Ok(()) => Delivery::Queued,
            Err(SendTimeoutError::Timeout(_)) => {
                log::warn!("Connection {} did not drain within {:?}, reply dropped", id, wait);
                Delivery::Dropped
            }
            Err(SendTimeoutError::Closed(_)) => {
                self.unregister(id).await;
                Delivery::Removed
            }
        }
    }

    /// Tell every connection to close and forget them all
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let count = {
            let mut subscribers = self.subscribers.write().await;
            let count = subscribers.len();
            subscribers.clear();
            count
        };
        log::info!("Closing {} stream connections", count);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }
}
