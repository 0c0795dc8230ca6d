//! Connection Registry
//!
//! Tracks live transport sessions, the identity bound to each, and the
//! outbound channel used to push messages to it.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::protocol::SignalingMessage;
use crate::relay::RelayError;

/// Opaque identifier of one live transport session. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outbound half of a connection
pub type Outbox = mpsc::UnboundedSender<SignalingMessage>;

struct ConnectionEntry {
    outbox: Outbox,
    account: Option<String>,
}

/// Registry of live connections
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, ConnectionEntry>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly opened session. Re-registering a live id is a no-op.
    pub fn register(&self, id: ConnectionId, outbox: Outbox) {
        let mut connections = self.connections.write();
        if connections.contains_key(&id) {
            return;
        }
        connections.insert(
            id,
            ConnectionEntry {
                outbox,
                account: None,
            },
        );
        log::debug!("Registered connection {} ({} live)", id, connections.len());
    }

    /// Forget a closed session. Returns false if it was not registered.
    ///
    /// Room cleanup is the caller's job (see `LifecycleManager::disconnect`).
    pub fn unregister(&self, id: ConnectionId) -> bool {
        let removed = self.connections.write().remove(&id).is_some();
        if removed {
            log::debug!("Unregistered connection {}", id);
        }
        removed
    }

    pub fn is_live(&self, id: ConnectionId) -> bool {
        self.connections.read().contains_key(&id)
    }

    /// Bind a stable account identity to a live connection
    pub fn bind_account(&self, id: ConnectionId, account: String) -> bool {
        match self.connections.write().get_mut(&id) {
            Some(entry) => {
                entry.account = Some(account);
                true
            }
            None => false,
        }
    }

    pub fn account(&self, id: ConnectionId) -> Option<String> {
        self.connections.read().get(&id)?.account.clone()
    }

    /// Queue a message for delivery to one connection.
    ///
    /// Fails with `TargetUnreachable` if the connection is gone or its writer
    /// has already shut down.
    pub fn send(&self, id: ConnectionId, message: SignalingMessage) -> Result<(), RelayError> {
        let connections = self.connections.read();
        let entry = connections
            .get(&id)
            .ok_or(RelayError::TargetUnreachable(id))?;
        entry
            .outbox
            .send(message)
            .map_err(|_| RelayError::TargetUnreachable(id))
    }
}

#[cfg(test)]
impl ConnectionRegistry {
    fn live_count(&self) -> usize {
        self.connections.read().len()
    }
}
