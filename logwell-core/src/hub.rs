//! Live fan-out hub.
//!
//! Producers broadcast entries onto one bounded central channel without
//! ever blocking; a full channel increments the dropped counter and the
//! entry is lost to live consumers (it is already persisted). A single
//! dispatcher task drains the channel, snapshots the subscriber registry
//! and delivers to every subscriber whose filter is a subset of the
//! entry's labels, with a bounded per-subscriber send deadline. Slow or
//! dead subscribers are evicted; periodic pings flush out dead-but-idle
//! connections.

use std::sync::atomic::Ordering;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use dashmap::DashMap;
use logwell_model::{LabelSet, LogEntry};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::counters::Counters;

pub const DEFAULT_BROADCAST_CAPACITY: usize = 5_000;
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);

/// Message delivered to a subscriber.
#[derive(Debug, Clone)]
pub enum StreamMessage {
    Entry(Arc<LogEntry>),
    /// Liveness probe; transports map this to their own ping frame.
    Ping,
}

/// Tuning knobs for the hub; defaults match production behavior, tests
/// shrink the timers.
#[derive(Debug, Clone)]
pub struct HubOptions {
    pub broadcast_capacity: usize,
    pub subscriber_capacity: usize,
    pub send_timeout: Duration,
    pub ping_interval: Duration,
}

impl Default for HubOptions {
    fn default() -> Self {
        Self {
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            ping_interval: DEFAULT_PING_INTERVAL,
        }
    }
}

/// A live consumer's receiving half.
#[derive(Debug)]
pub struct Subscription {
    pub id: Uuid,
    pub rx: mpsc::Receiver<StreamMessage>,
}

#[derive(Debug)]
struct SubscriberHandle {
    filter: RwLock<LabelSet>,
    tx: mpsc::Sender<StreamMessage>,
}

impl SubscriberHandle {
    fn filter_matches(&self, labels: &LabelSet) -> bool {
        self.filter
            .read()
            .expect("subscriber filter lock poisoned")
            .is_subset_of(labels)
    }
}

#[derive(Debug)]
pub struct StreamHub {
    subscribers: DashMap<Uuid, Arc<SubscriberHandle>>,
    tx: mpsc::Sender<Arc<LogEntry>>,
    options: HubOptions,
    counters: Arc<Counters>,
}

impl StreamHub {
    /// Create the hub and spawn its dispatcher. The dispatcher exits when
    /// `cancel` fires and closes every subscriber on the way out.
    pub fn spawn(
        options: HubOptions,
        counters: Arc<Counters>,
        cancel: CancellationToken,
    ) -> (Arc<Self>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(options.broadcast_capacity.max(1));
        let hub = Arc::new(Self {
            subscribers: DashMap::new(),
            tx,
            options,
            counters,
        });
        let handle = tokio::spawn(dispatch_loop(hub.clone(), rx, cancel));
        (hub, handle)
    }

    /// Register a live subscriber with the given label filter. An empty
    /// filter matches every entry.
    pub fn subscribe(&self, filter: LabelSet) -> Subscription {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.options.subscriber_capacity.max(1));
        self.subscribers.insert(
            id,
            Arc::new(SubscriberHandle {
                filter: RwLock::new(filter),
                tx,
            }),
        );
        self.counters
            .active_subscribers
            .fetch_add(1, Ordering::Relaxed);
        debug!(subscriber = %id, "subscriber registered");
        Subscription { id, rx }
    }

    pub fn unsubscribe(&self, id: Uuid) {
        if self.subscribers.remove(&id).is_some() {
            self.counters
                .active_subscribers
                .fetch_sub(1, Ordering::Relaxed);
            debug!(subscriber = %id, "subscriber removed");
        }
    }

    /// Atomically replace a subscriber's filter; takes effect for the
    /// next broadcast. A broadcast racing the swap may apply the old
    /// filter to one entry.
    pub fn update_filter(&self, id: Uuid, filter: LabelSet) -> bool {
        match self.subscribers.get(&id) {
            Some(handle) => {
                *handle.filter.write().expect("subscriber filter lock poisoned") = filter;
                true
            }
            None => false,
        }
    }

    /// Non-blocking broadcast. A full central channel drops the entry for
    /// live consumers and counts it; the write path is never delayed.
    pub fn broadcast(&self, entry: Arc<LogEntry>) {
        match self.tx.try_send(entry) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.counters
                    .dropped_broadcasts
                    .fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("broadcast after hub shutdown");
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn close_all(&self) {
        let drained = self.subscribers.len() as u64;
        self.subscribers.clear();
        self.counters
            .active_subscribers
            .fetch_sub(drained, Ordering::Relaxed);
    }

    fn snapshot(&self) -> Vec<(Uuid, Arc<SubscriberHandle>)> {
        self.subscribers
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect()
    }

    async fn deliver(&self, message: StreamMessage, labels: Option<&LabelSet>) {
        let mut evicted = Vec::new();
        for (id, handle) in self.snapshot() {
            if let Some(labels) = labels
                && !handle.filter_matches(labels)
            {
                continue;
            }
            let send = handle.tx.send(message.clone());
            match tokio::time::timeout(self.options.send_timeout, send).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => evicted.push((id, "closed")),
                Err(_) => evicted.push((id, "send deadline exceeded")),
            }
        }
        for (id, reason) in evicted {
            warn!(subscriber = %id, reason, "evicting subscriber");
            self.unsubscribe(id);
        }
    }
}

async fn dispatch_loop(
    hub: Arc<StreamHub>,
    mut rx: mpsc::Receiver<Arc<LogEntry>>,
    cancel: CancellationToken,
) {
    let mut ping = tokio::time::interval(hub.options.ping_interval);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; swallow it.
    ping.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            entry = rx.recv() => {
                let Some(entry) = entry else { break };
                let labels = entry.labels.clone();
                hub.deliver(StreamMessage::Entry(entry), Some(&labels)).await;
            }
            _ = ping.tick() => {
                hub.deliver(StreamMessage::Ping, None).await;
            }
        }
    }

    info!(subscribers = hub.subscriber_count(), "stream hub stopping");
    hub.close_all();
}
