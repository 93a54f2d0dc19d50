use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use super::bridge::SessionBridge;

struct Binding {
    bridge: Arc<dyn SessionBridge>,
    sweeper: Option<JoinHandle<()>>,
}

impl Drop for Binding {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

/// Holds at most one bridge per server name.
#[derive(Default)]
pub struct BridgeRegistry {
    bindings: Mutex<HashMap<String, Binding>>,
}

impl BridgeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `bridge` for `server`, replacing (and shutting down) any
    /// previous binding. Starts the expiration sweep when the bridge has a
    /// non-zero interval. Must be called from within a tokio runtime.
    pub fn install(&self, server: &str, bridge: Arc<dyn SessionBridge>) {
        let sweeper = spawn_sweeper(server, bridge.clone());
        let previous = self.lock().insert(
            server.to_string(),
            Binding { bridge, sweeper },
        );
        if previous.is_some() {
            tracing::info!("Replaced session bridge for server {}", server);
        }
    }

    /// Returns whether a bridge was installed.
    pub fn remove(&self, server: &str) -> bool {
        self.lock().remove(server).is_some()
    }

    pub fn get(&self, server: &str) -> Option<Arc<dyn SessionBridge>> {
        self.lock().get(server).map(|b| b.bridge.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Binding>> {
        self.bindings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn spawn_sweeper(server: &str, bridge: Arc<dyn SessionBridge>) -> Option<JoinHandle<()>> {
    let period = bridge.expire_interval();
    if period.is_zero() {
        tracing::debug!("Session expiration disabled for server {}", server);
        return None;
    }

    let server = server.to_string();
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match bridge.expire().await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Expired {} sessions on server {}", n, server),
                Err(e) => tracing::error!("Session expiration failed on server {}: {}", server, e),
            }
        }
    }))
}
