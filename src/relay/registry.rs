use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};

/// Identifier handed out when a connection is registered.
pub type ConnectionId = u64;

/// Currently open WebSocket connections.
///
/// Shared through an `Arc` by the accept loop and the connection threads.
/// Ids are never reused, so an entry always refers to exactly one channel.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    next_id: AtomicU64,
    open: Mutex<HashMap<ConnectionId, SocketAddr>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection after a successful handshake.
    pub fn register(&self, peer: SocketAddr) -> Result<ConnectionId> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let total = {
            let mut open = self
                .open
                .lock()
                .map_err(|_| anyhow!("connection registry lock poisoned"))?;
            open.insert(id, peer);
            open.len()
        };
        log::info!("client {} connected ({}). total connections: {}", id, peer, total);
        Ok(id)
    }

    /// Remove a connection. Returns false if it was not registered.
    pub fn deregister(&self, id: ConnectionId) -> Result<bool> {
        let (removed, total) = {
            let mut open = self
                .open
                .lock()
                .map_err(|_| anyhow!("connection registry lock poisoned"))?;
            (open.remove(&id), open.len())
        };
        match removed {
            Some(peer) => {
                log::info!(
                    "client {} disconnected ({}). total connections: {}",
                    id,
                    peer,
                    total
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn len(&self) -> usize {
        self.open.lock().map(|open| open.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.open
            .lock()
            .map(|open| open.contains_key(&id))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn register_and_deregister() -> Result<()> {
        let registry = ConnectionRegistry::new();
        let a = registry.register(peer(5000))?;
        let b = registry.register(peer(5000))?;
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);

        assert!(registry.deregister(a)?);
        assert!(!registry.contains(a));
        assert!(registry.contains(b));
        assert!(!registry.deregister(a)?);
        assert!(registry.deregister(b)?);
        assert!(registry.is_empty());
        Ok(())
    }
}
