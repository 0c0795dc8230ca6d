//! Presence Broadcaster
//!
//! Fans roster and media-state changes out to room members. Each recipient
//! gets its own copy; a recipient that has gone away is logged and skipped.
//!
//! These are called from inside the room store's `notify` callbacks, so they
//! must only queue messages and never block.

use std::sync::Arc;

use crate::protocol::SignalingMessage;
use crate::registry::{ConnectionId, ConnectionRegistry};
use crate::room::{Departure, JoinOutcome, MemberScope};

/// Which media toggle changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Camera,
    Mic,
}

pub struct PresenceBroadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl PresenceBroadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Queue the join response (existing roster plus the assigned id) for the
    /// newcomer and announce the newcomer to everyone already in the room.
    pub fn broadcast_roster_on_join(&self, outcome: &JoinOutcome) {
        let joiner = outcome.participant.id;
        let response = SignalingMessage::RoomJoined {
            success: true,
            connection_id: Some(joiner),
            room_name: Some(outcome.room_name.clone()),
            participants: Some(outcome.others.clone()),
            error: None,
        };
        if let Err(e) = self.registry.send(joiner, response) {
            log::warn!("Failed to send join response in room {}: {}", outcome.room_name, e);
        }

        let announcement = SignalingMessage::ParticipantJoined {
            participant: outcome.participant.clone(),
        };
        let recipients: Vec<ConnectionId> = outcome.others.iter().map(|p| p.id).collect();
        self.fan_out(&outcome.room_name, &recipients, announcement);
    }

    /// Tell the other members about a camera or mic change
    pub fn broadcast_toggle(
        &self,
        scope: &MemberScope,
        connection_id: ConnectionId,
        kind: MediaKind,
        enabled: bool,
    ) {
        let message = match kind {
            MediaKind::Camera => SignalingMessage::CameraToggled {
                participant_id: connection_id,
                enabled,
            },
            MediaKind::Mic => SignalingMessage::MicToggled {
                participant_id: connection_id,
                enabled,
            },
        };
        self.fan_out(&scope.room_name, &scope.others, message);
    }

    /// Tell the other members whether a participant is currently speaking
    pub fn broadcast_talking(&self, scope: &MemberScope, connection_id: ConnectionId, talking: bool) {
        let message = SignalingMessage::ParticipantTalking {
            participant_id: connection_id,
            talking,
        };
        self.fan_out(&scope.room_name, &scope.others, message);
    }

    /// Tell the remaining members that a participant departed. Nothing is
    /// sent when the departure emptied the room.
    pub fn broadcast_left(&self, departure: &Departure) {
        if departure.room_removed {
            return;
        }
        let message = SignalingMessage::ParticipantLeft {
            participant_id: departure.participant.id,
        };
        self.fan_out(&departure.room_name, &departure.remaining, message);
    }

    fn fan_out(&self, room_name: &str, recipients: &[ConnectionId], message: SignalingMessage) {
        log::debug!(
            "Broadcasting {} to {} member(s) of room {}",
            message.kind(),
            recipients.len(),
            room_name
        );
        for recipient in recipients {
            if let Err(e) = self.registry.send(*recipient, message.clone()) {
                log::warn!("Failed to send {} in room {}: {}", message.kind(), room_name, e);
            }
        }
    }
}
