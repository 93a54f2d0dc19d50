use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::net::TcpStream;

pub const CONNECTION: &str = "connection";
pub const LISTENING: &str = "listening";
pub const CLOSE: &str = "close";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEvent {
    pub server: String,
    pub name: String,
    pub peer: Option<SocketAddr>,
}

pub type EventHandler = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Publish/subscribe registry for server events.
///
/// The transport hook behind an event is only active while the event has at
/// least one subscriber: [`EventHub::is_active`] flips on the first
/// subscription and off when the last one is removed.
#[derive(Default)]
pub struct EventHub {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<String, Vec<(SubscriptionId, EventHandler)>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id of the new subscription and the subscriber count for
    /// `event` after adding it.
    pub fn subscribe(&self, event: &str, handler: EventHandler) -> (SubscriptionId, usize) {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut subscribers = self.lock();
        let list = subscribers.entry(event.to_string()).or_default();
        list.push((id, handler));
        if list.len() == 1 {
            tracing::debug!("Installed {} hook", event);
        }
        (id, list.len())
    }

    /// Returns the subscriber count left for `event`.
    pub fn unsubscribe(&self, event: &str, id: SubscriptionId) -> usize {
        let mut subscribers = self.lock();
        let Some(list) = subscribers.get_mut(event) else {
            return 0;
        };
        list.retain(|(sid, _)| *sid != id);
        let remaining = list.len();
        if remaining == 0 {
            subscribers.remove(event);
            tracing::debug!("Removed {} hook", event);
        }
        remaining
    }

    pub fn is_active(&self, event: &str) -> bool {
        self.lock().contains_key(event)
    }

    pub fn subscriber_count(&self, event: &str) -> usize {
        self.lock().get(event).map_or(0, Vec::len)
    }

    /// Handlers run outside the registry lock, so they may subscribe or
    /// unsubscribe themselves.
    pub fn emit(&self, event: &ServerEvent) -> usize {
        let handlers: Vec<EventHandler> = match self.lock().get(&event.name) {
            Some(list) => list.iter().map(|(_, h)| h.clone()).collect(),
            None => return 0,
        };
        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<(SubscriptionId, EventHandler)>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Per-connection hook for `ListenerExt::tap_io`: reports every accepted
/// stream to `events` while the `connection` event has subscribers.
pub fn connection_tap(
    server: String,
    events: Arc<EventHub>,
) -> impl FnMut(&mut TcpStream) + Send + 'static {
    move |stream| {
        if events.is_active(CONNECTION) {
            events.emit(&ServerEvent {
                server: server.clone(),
                name: CONNECTION.to_string(),
                peer: stream.peer_addr().ok(),
            });
        }
    }
}
