//! In-memory fan-out of live update notifications.
//!
//! Subscribers hold a bounded channel per key. Broadcasting never blocks: a
//! subscriber whose buffer is full simply misses the message.

use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use tokio::sync::mpsc;
use tokio_stream::Stream;
use tracing::trace;

/// Default per-subscriber buffer
pub const DEFAULT_BUFFER: usize = 16;

/// Channel a subscriber listens on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelKey {
    Process(String),
    Role { workflow_key: String, role: String },
}

impl ChannelKey {
    pub fn process(id: impl Into<String>) -> Self {
        ChannelKey::Process(id.into())
    }

    pub fn role(workflow_key: impl Into<String>, role: impl Into<String>) -> Self {
        ChannelKey::Role {
            workflow_key: workflow_key.into(),
            role: role.into(),
        }
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKey::Process(id) => write!(f, "process:{}", id),
            ChannelKey::Role { workflow_key, role } => write!(f, "role:{}:{}", workflow_key, role),
        }
    }
}

/// "Something changed" notification; payload is the affected process ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveEvent {
    ProcessUpdated { process_id: String },
    RoleUpdated { process_id: String },
}

impl LiveEvent {
    /// SSE event name
    pub fn name(&self) -> &'static str {
        match self {
            LiveEvent::ProcessUpdated { .. } => "process-updated",
            LiveEvent::RoleUpdated { .. } => "role-updated",
        }
    }

    pub fn process_id(&self) -> &str {
        match self {
            LiveEvent::ProcessUpdated { process_id } | LiveEvent::RoleUpdated { process_id } => {
                process_id
            }
        }
    }
}

type Subscribers = HashMap<ChannelKey, Vec<(u64, mpsc::Sender<LiveEvent>)>>;

#[derive(Default)]
struct Inner {
    subscribers: Mutex<Subscribers>,
    next_id: AtomicU64,
}

/// Per-key publish/subscribe table, cheap to clone
#[derive(Clone)]
pub struct Broadcaster {
    inner: Arc<Inner>,
    buffer: usize,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}

impl fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broadcaster")
            .field("buffer", &self.buffer)
            .field("subscribers", &self.subscriber_total())
            .finish()
    }
}

impl Broadcaster {
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: Arc::new(Inner::default()),
            buffer: buffer.max(1),
        }
    }

    fn table(&self) -> MutexGuard<'_, Subscribers> {
        // A panic while holding the lock leaves the table usable
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a new subscriber; dropping the guard unsubscribes
    pub fn subscribe(&self, key: ChannelKey) -> Subscription {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.table().entry(key.clone()).or_default().push((id, tx));
        trace!(channel = %key, subscriber = id, "Subscribed");

        Subscription {
            broadcaster: self.clone(),
            key,
            id,
            rx,
        }
    }

    /// Push to every current subscriber of `key`; returns how many accepted it
    pub fn broadcast(&self, key: &ChannelKey, event: LiveEvent) -> usize {
        let table = self.table();
        let Some(subscribers) = table.get(key) else {
            return 0;
        };

        let mut delivered = 0;
        for (id, tx) in subscribers {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => trace!(channel = %key, subscriber = id, "Dropped event"),
            }
        }
        delivered
    }

    fn unsubscribe(&self, key: &ChannelKey, id: u64) {
        let mut table = self.table();
        if let Some(subscribers) = table.get_mut(key) {
            subscribers.retain(|(sid, _)| *sid != id);
            if subscribers.is_empty() {
                table.remove(key);
            }
        }
        trace!(channel = %key, subscriber = id, "Unsubscribed");
    }

    pub fn subscriber_count(&self, key: &ChannelKey) -> usize {
        self.table().get(key).map_or(0, Vec::len)
    }

    fn subscriber_total(&self) -> usize {
        self.table().values().map(Vec::len).sum()
    }
}

/// Receiving half of a subscription
pub struct Subscription {
    broadcaster: Broadcaster,
    key: ChannelKey,
    id: u64,
    rx: mpsc::Receiver<LiveEvent>,
}

impl Subscription {
    pub fn key(&self) -> &ChannelKey {
        &self.key
    }

    /// Next event, or `None` once the channel is closed
    pub async fn recv(&mut self) -> Option<LiveEvent> {
        self.rx.recv().await
    }
}

impl Stream for Subscription {
    type Item = LiveEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<LiveEvent>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.rx.close();
        self.broadcaster.unsubscribe(&self.key, self.id);
    }
}
