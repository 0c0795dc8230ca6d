//! Lifecycle Manager
//!
//! Owns the per-connection state machine (`Unjoined -> InRoom -> Unjoined`)
//! and is the single dispatch point for inbound messages. Explicit leave and
//! transport disconnect share one cleanup path, which is idempotent: whoever
//! removes the participant record first broadcasts, everyone else is a no-op.
//!
//! Presence messages are queued from inside the room store's critical
//! section, so a member never sees a leave for someone before the roster
//! that introduced them.

use log::{info, warn};
use std::sync::Arc;

use crate::identity::CredentialValidator;
use crate::presence::{MediaKind, PresenceBroadcaster};
use crate::protocol::SignalingMessage;
use crate::registry::{ConnectionId, ConnectionRegistry, Outbox};
use crate::relay::{SignalKind, SignalingRelay};
use crate::room::{Departure, MemberScope, RoomError, RoomStore};

pub struct LifecycleManager {
    registry: Arc<ConnectionRegistry>,
    rooms: RoomStore,
    relay: SignalingRelay,
    presence: PresenceBroadcaster,
    credentials: Arc<dyn CredentialValidator>,
}

impl LifecycleManager {
    pub fn new(credentials: Arc<dyn CredentialValidator>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        Self {
            relay: SignalingRelay::new(registry.clone()),
            presence: PresenceBroadcaster::new(registry.clone()),
            rooms: RoomStore::new(),
            registry,
            credentials,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn rooms(&self) -> &RoomStore {
        &self.rooms
    }

    /// Transport opened a session: register it and tell the client its id
    pub fn connect(&self, id: ConnectionId, outbox: Outbox) {
        self.registry.register(id, outbox);
        if let Err(e) = self.registry.send(id, SignalingMessage::Welcome { connection_id: id }) {
            warn!("Failed to greet {}: {}", id, e);
        }
    }

    /// Transport closed a session. Safe to call after `leave` or more than once.
    pub fn disconnect(&self, id: ConnectionId) {
        if let Some(departure) = self.depart(id) {
            info!(
                "Participant {} ({}) disconnected from room {}",
                departure.participant.display_name, id, departure.room_name
            );
        }
        self.registry.unregister(id);
    }

    pub fn create_room(&self, name: &str) -> SignalingMessage {
        match self.rooms.create_room(name) {
            Ok(room) => SignalingMessage::RoomCreated {
                success: true,
                room_id: Some(room.id),
                room_name: Some(room.name),
                error: None,
            },
            Err(e) => SignalingMessage::RoomCreated {
                success: false,
                room_id: None,
                room_name: None,
                error: Some(e.to_string()),
            },
        }
    }

    /// `Unjoined --join--> InRoom`. On success the `RoomJoined` response is
    /// already queued on the joiner's outbox.
    pub fn join(&self, id: ConnectionId, room_name: &str, display_name: &str) -> Result<(), RoomError> {
        let account = self.registry.account(id);
        self.rooms.join_room(room_name, id, display_name, account, |outcome| {
            self.presence.broadcast_roster_on_join(outcome)
        })?;
        Ok(())
    }

    /// `InRoom --leave--> Unjoined`. Returns false if the connection was not in a room.
    pub fn leave(&self, id: ConnectionId) -> bool {
        self.depart(id).is_some()
    }

    fn depart(&self, id: ConnectionId) -> Option<Departure> {
        self.rooms
            .leave_room(id, |departure| self.presence.broadcast_left(departure))
    }

    pub fn toggle(&self, id: ConnectionId, kind: MediaKind, enabled: bool) {
        let notify = |scope: &MemberScope| self.presence.broadcast_toggle(scope, id, kind, enabled);
        let changed = match kind {
            MediaKind::Camera => self.rooms.set_camera_state(id, enabled, notify),
            MediaKind::Mic => self.rooms.set_mic_state(id, enabled, notify),
        };
        if changed.is_some() {
            info!("Participant {} {:?}: {}", id, kind, enabled);
        }
    }

    pub fn update_talking(&self, id: ConnectionId, talking: bool) {
        self.rooms
            .peers_of(id, |scope| self.presence.broadcast_talking(scope, id, talking));
    }

    fn authenticate(&self, id: ConnectionId, account: &str, password: &str) -> SignalingMessage {
        match self.credentials.validate(account, password) {
            Some(account) if self.registry.bind_account(id, account.clone()) => {
                info!("Connection {} authenticated as {}", id, account);
                SignalingMessage::AuthenticateResponse {
                    success: true,
                    account: Some(account),
                    error: None,
                }
            }
            _ => {
                warn!("Failed authentication for {} from {}", account, id);
                SignalingMessage::AuthenticateResponse {
                    success: false,
                    account: None,
                    error: Some("Invalid credentials".to_string()),
                }
            }
        }
    }

    /// Handle one inbound message. Returns the reply for the sender, if any.
    pub fn handle(&self, id: ConnectionId, message: SignalingMessage) -> Option<SignalingMessage> {
        match message {
            SignalingMessage::Authenticate { account, password } => {
                Some(self.authenticate(id, &account, &password))
            }

            SignalingMessage::ListRooms => Some(SignalingMessage::RoomList {
                rooms: self.rooms.list_rooms(),
            }),

            SignalingMessage::CreateRoom { name } => Some(self.create_room(&name)),

            SignalingMessage::JoinRoom { room_name, display_name } => {
                match self.join(id, &room_name, &display_name) {
                    Ok(()) => None,
                    Err(e) => {
                        info!("Join of {} to room '{}' rejected: {}", id, room_name.trim(), e);
                        Some(SignalingMessage::RoomJoined {
                            success: false,
                            connection_id: None,
                            room_name: None,
                            participants: None,
                            error: Some(e.to_string()),
                        })
                    }
                }
            }

            SignalingMessage::LeaveRoom => {
                if self.leave(id) {
                    Some(SignalingMessage::RoomLeft { success: true, error: None })
                } else {
                    Some(SignalingMessage::RoomLeft {
                        success: false,
                        error: Some("Not in a room".to_string()),
                    })
                }
            }

            SignalingMessage::ToggleCamera { enabled } => {
                self.toggle(id, MediaKind::Camera, enabled);
                None
            }

            SignalingMessage::ToggleMic { enabled } => {
                self.toggle(id, MediaKind::Mic, enabled);
                None
            }

            SignalingMessage::UpdateTalking { talking } => {
                self.update_talking(id, talking);
                None
            }

            SignalingMessage::SendOffer { target_id, payload, room_name } => {
                let _ = self.relay.relay(SignalKind::Offer, id, target_id, payload, room_name.as_deref());
                None
            }

            SignalingMessage::SendAnswer { target_id, payload, room_name } => {
                let _ = self.relay.relay(SignalKind::Answer, id, target_id, payload, room_name.as_deref());
                None
            }

            SignalingMessage::SendIceCandidate { target_id, payload, room_name } => {
                let _ = self.relay.relay(
                    SignalKind::IceCandidate,
                    id,
                    target_id,
                    payload,
                    room_name.as_deref(),
                );
                None
            }

            other => {
                warn!("Unsupported message {} from {}", other.kind(), id);
                Some(SignalingMessage::Error {
                    message: "Unsupported message type".to_string(),
                })
            }
        }
    }
}
