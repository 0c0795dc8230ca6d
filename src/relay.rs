//! Signaling Relay
//!
//! Point-to-point forwarding of opaque negotiation payloads. Delivery is
//! best-effort: a message for a connection that is no longer live is dropped.

use serde_json::Value;
use std::sync::Arc;

use crate::protocol::SignalingMessage;
use crate::registry::{ConnectionId, ConnectionRegistry};

/// Relay errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("Connection {0} is not reachable")]
    TargetUnreachable(ConnectionId),
}

/// Kind of negotiation message being relayed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

impl SignalKind {
    fn delivery(self, sender_id: ConnectionId, payload: Value) -> SignalingMessage {
        match self {
            SignalKind::Offer => SignalingMessage::ReceiveOffer { sender_id, payload },
            SignalKind::Answer => SignalingMessage::ReceiveAnswer { sender_id, payload },
            SignalKind::IceCandidate => SignalingMessage::ReceiveIceCandidate { sender_id, payload },
        }
    }
}

/// Routes negotiation messages between two connections
pub struct SignalingRelay {
    registry: Arc<ConnectionRegistry>,
}

impl SignalingRelay {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Forward `payload` from `sender` to `target`.
    ///
    /// The room name is only used for log context. Failures are logged and
    /// returned for callers that care, but never reported to the sender.
    pub fn relay(
        &self,
        kind: SignalKind,
        sender: ConnectionId,
        target: ConnectionId,
        payload: Value,
        room_name: Option<&str>,
    ) -> Result<(), RelayError> {
        let room = room_name.unwrap_or("-");
        if !self.registry.is_live(target) {
            log::debug!(
                "Dropping {:?} from {} to {} in room {}: target not live",
                kind,
                sender,
                target,
                room
            );
            return Err(RelayError::TargetUnreachable(target));
        }

        log::debug!("Relaying {:?} from {} to {} in room {}", kind, sender, target, room);
        self.registry
            .send(target, kind.delivery(sender, payload))
            .map_err(|e| {
                log::debug!("Dropping {:?} from {}: {}", kind, sender, e);
                e
            })
    }
}
