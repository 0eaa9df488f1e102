//! Broadcast hub.
//!
//! Fans each stored record out to every subscriber. Every subscriber owns a
//! small bounded queue drained by its own delivery task; publishing never
//! waits on a subscriber, a full queue just drops that record for that
//! subscriber.

use async_trait::async_trait;
use log::{debug, info, trace, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

pub const DEFAULT_QUEUE_SIZE: usize = 8;
pub const DEFAULT_TICK: Duration = Duration::from_millis(8);

/// Serialized record as delivered to sinks
pub type Payload = Arc<[u8]>;

pub type SubscriberId = u64;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Peer closed the connection")]
    Closed,
    #[error("Send failed: {0}")]
    Transport(String),
}

/// A sequential consumer of serialized records
#[async_trait]
pub trait Sink: Send + 'static {
    /// Short description for logs, e.g. the peer address
    fn describe(&self) -> String;

    async fn send(&mut self, payload: &[u8]) -> Result<(), SinkError>;

    /// Resolves once the peer has gone away
    async fn closed(&mut self);
}

#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Outbound queue length per subscriber
    pub queue_size: usize,
    /// Minimum interval between two writes to one subscriber
    pub tick: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_size: DEFAULT_QUEUE_SIZE,
            tick: DEFAULT_TICK,
        }
    }
}

pub struct BroadcastHub {
    config: HubConfig,
    subscribers: RwLock<HashMap<SubscriberId, mpsc::Sender<Payload>>>,
    next_id: AtomicU64,
    dropped: AtomicU64,
}

impl BroadcastHub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            config,
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().unwrap().len()
    }

    /// Records dropped on full queues since start
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Queue `payload` for every subscriber without waiting.
    ///
    /// Returns the number of subscribers it was queued for.
    pub fn publish(&self, payload: Payload) -> usize {
        let subscribers = self.subscribers.read().unwrap();
        let mut queued = 0;
        for (id, tx) in subscribers.iter() {
            match tx.try_send(payload.clone()) {
                Ok(()) => queued += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    trace!("Subscriber {} queue full, dropping record", id);
                }
                // delivery task is exiting and will unsubscribe itself
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        queued
    }

    /// Register `sink` and start its delivery task.
    ///
    /// The task ends when the sink fails, the peer closes or the subscriber
    /// is unsubscribed.
    pub fn subscribe<S: Sink>(self: &Arc<Self>, sink: S) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.config.queue_size.max(1));
        self.subscribers.write().unwrap().insert(id, tx);

        info!("Subscriber {} ({}) connected", id, sink.describe());
        tokio::spawn(deliver(self.clone(), id, sink, rx, self.config.tick));
        id
    }

    /// Remove a subscriber; its delivery task finishes once the queue is
    /// drained. Returns false if it was not subscribed.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers.write().unwrap().remove(&id).is_some();
        if removed {
            debug!("Subscriber {} unsubscribed", id);
        }
        removed
    }

    /// Unsubscribe everyone, used at shutdown
    pub fn close_all(&self) {
        let mut subscribers = self.subscribers.write().unwrap();
        if !subscribers.is_empty() {
            debug!("Closing {} subscribers", subscribers.len());
        }
        subscribers.clear();
    }
}

async fn deliver<S: Sink>(
    hub: Arc<BroadcastHub>,
    id: SubscriberId,
    mut sink: S,
    mut rx: mpsc::Receiver<Payload>,
    tick: Duration,
) {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let payload = tokio::select! {
            payload = rx.recv() => match payload {
                Some(payload) => payload,
                None => break,
            },
            _ = sink.closed() => {
                info!("Subscriber {} ({}) disconnected", id, sink.describe());
                break;
            }
        };

        interval.tick().await;
        if let Err(e) = sink.send(&payload).await {
            warn!("Subscriber {} ({}) send failed: {}", id, sink.describe(), e);
            break;
        }
    }

    hub.unsubscribe(id);
}
