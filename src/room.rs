//! Room Management
//!
//! Handles room creation, joining, leaving and per-participant media state.
//!
//! Rooms and the connection -> room index live behind one lock, so every
//! check-then-mutate sequence (unique name on create, empty room removal on
//! leave) is atomic with respect to other connections.
//!
//! Mutations take a `notify` callback that runs while the lock is still held.
//! Callers queue their presence messages from it, so each member observes
//! joins, leaves and toggles in the same order the store applied them.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

use crate::protocol::{ParticipantInfo, RoomInfo};
use crate::registry::ConnectionId;

/// Represents a participant in a room
#[derive(Debug, Clone)]
pub struct Participant {
    pub connection_id: ConnectionId,
    pub display_name: String,
    pub account: Option<String>,
    pub joined_at: DateTime<Utc>,
    pub camera_on: bool,
    pub mic_on: bool,
}

impl Participant {
    pub fn new(connection_id: ConnectionId, display_name: String, account: Option<String>) -> Self {
        Self {
            connection_id,
            display_name,
            account,
            joined_at: Utc::now(),
            camera_on: true,
            mic_on: true,
        }
    }

    pub fn info(&self) -> ParticipantInfo {
        ParticipantInfo {
            id: self.connection_id,
            display_name: self.display_name.clone(),
            account: self.account.clone(),
            camera_on: self.camera_on,
            mic_on: self.mic_on,
            joined_at: self.joined_at,
        }
    }
}

/// Represents a meeting room
#[derive(Debug)]
pub struct Room {
    pub id: String,
    pub name: String,
    participants: HashMap<ConnectionId, Participant>,
}

impl Room {
    fn new(name: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            participants: HashMap::new(),
        }
    }

    fn info(&self) -> RoomInfo {
        RoomInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            participants: self.participants.len() as u32,
        }
    }

    fn member_ids_except(&self, excluded: ConnectionId) -> Vec<ConnectionId> {
        self.participants
            .keys()
            .copied()
            .filter(|id| *id != excluded)
            .collect()
    }
}

/// Room-related errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("Room '{0}' does not exist")]
    NotFound(String),
    #[error("Room '{0}' already exists")]
    AlreadyExists(String),
    #[error("{0} cannot be empty")]
    InvalidInput(&'static str),
    #[error("Already in room '{0}'")]
    AlreadyInRoom(String),
}

/// Result of a successful join
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub room_name: String,
    pub participant: ParticipantInfo,
    /// Everyone already in the room, excluding the joining connection
    pub others: Vec<ParticipantInfo>,
}

/// Result of removing a participant
#[derive(Debug, Clone)]
pub struct Departure {
    pub room_name: String,
    pub participant: ParticipantInfo,
    /// Members left behind; empty when the room was removed
    pub remaining: Vec<ConnectionId>,
    pub room_removed: bool,
}

/// Room membership as seen from one member
#[derive(Debug, Clone)]
pub struct MemberScope {
    pub room_name: String,
    pub others: Vec<ConnectionId>,
}

#[derive(Default)]
struct StoreInner {
    /// Normalized name -> room
    rooms: HashMap<String, Room>,
    /// Connection -> normalized room name
    memberships: HashMap<ConnectionId, String>,
}

/// Trim and lowercase a room name into its lookup key
fn room_key(name: &str) -> Option<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Manages all rooms
#[derive(Default)]
pub struct RoomStore {
    inner: Mutex<StoreInner>,
}

impl RoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new room. The stored name is the trimmed input.
    pub fn create_room(&self, name: &str) -> Result<RoomInfo, RoomError> {
        let key = room_key(name).ok_or(RoomError::InvalidInput("Room name"))?;
        let name = name.trim().to_string();

        let mut inner = self.inner.lock();
        if let Some(existing) = inner.rooms.get(&key) {
            return Err(RoomError::AlreadyExists(existing.name.clone()));
        }

        let room = Room::new(name);
        let info = room.info();
        inner.rooms.insert(key, room);
        log::info!("Created room: {} ({})", info.name, info.id);
        Ok(info)
    }

    /// Join an existing room. `notify` runs under the store lock.
    pub fn join_room<F>(
        &self,
        name: &str,
        connection_id: ConnectionId,
        display_name: &str,
        account: Option<String>,
        notify: F,
    ) -> Result<JoinOutcome, RoomError>
    where
        F: FnOnce(&JoinOutcome),
    {
        let key = room_key(name).ok_or(RoomError::InvalidInput("Room name"))?;
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(RoomError::InvalidInput("Display name"));
        }

        let mut inner = self.inner.lock();
        if let Some(current) = inner.memberships.get(&connection_id) {
            let current_name = inner
                .rooms
                .get(current)
                .map(|r| r.name.clone())
                .unwrap_or_else(|| current.clone());
            return Err(RoomError::AlreadyInRoom(current_name));
        }

        let room = inner
            .rooms
            .get_mut(&key)
            .ok_or_else(|| RoomError::NotFound(name.trim().to_string()))?;

        let others = room.participants.values().map(Participant::info).collect();
        let participant = Participant::new(connection_id, display_name.to_string(), account);
        let info = participant.info();
        room.participants.insert(connection_id, participant);
        let room_name = room.name.clone();

        inner.memberships.insert(connection_id, key);
        log::info!(
            "Participant {} ({}) joined room {}",
            display_name,
            connection_id,
            room_name
        );

        let outcome = JoinOutcome {
            room_name,
            participant: info,
            others,
        };
        notify(&outcome);
        drop(inner);
        Ok(outcome)
    }

    /// Leave the current room, removing the room if it becomes empty.
    ///
    /// Returns `None` when the connection is not in any room; `notify` only
    /// runs for the call that actually removed the participant.
    pub fn leave_room<F>(&self, connection_id: ConnectionId, notify: F) -> Option<Departure>
    where
        F: FnOnce(&Departure),
    {
        let mut inner = self.inner.lock();
        let key = inner.memberships.remove(&connection_id)?;
        let room = inner.rooms.get_mut(&key)?;
        let participant = room.participants.remove(&connection_id)?;
        let room_name = room.name.clone();
        let remaining: Vec<ConnectionId> = room.participants.keys().copied().collect();

        log::info!(
            "Participant {} ({}) left room {}",
            participant.display_name,
            connection_id,
            room_name
        );

        let room_removed = remaining.is_empty();
        if room_removed {
            inner.rooms.remove(&key);
            log::info!("Room {} is now empty and has been removed", room_name);
        }

        let departure = Departure {
            room_name,
            participant: participant.info(),
            remaining,
            room_removed,
        };
        notify(&departure);
        drop(inner);
        Some(departure)
    }

    /// Update camera state. `notify` gets the members to tell.
    pub fn set_camera_state<F>(&self, connection_id: ConnectionId, on: bool, notify: F) -> Option<MemberScope>
    where
        F: FnOnce(&MemberScope),
    {
        self.update_participant(connection_id, |p| p.camera_on = on, notify)
    }

    /// Update microphone state. `notify` gets the members to tell.
    pub fn set_mic_state<F>(&self, connection_id: ConnectionId, on: bool, notify: F) -> Option<MemberScope>
    where
        F: FnOnce(&MemberScope),
    {
        self.update_participant(connection_id, |p| p.mic_on = on, notify)
    }

    fn update_participant<A, F>(&self, connection_id: ConnectionId, apply: A, notify: F) -> Option<MemberScope>
    where
        A: FnOnce(&mut Participant),
        F: FnOnce(&MemberScope),
    {
        let mut inner = self.inner.lock();
        let key = inner.memberships.get(&connection_id)?.clone();
        let room = inner.rooms.get_mut(&key)?;
        apply(room.participants.get_mut(&connection_id)?);
        let scope = MemberScope {
            room_name: room.name.clone(),
            others: room.member_ids_except(connection_id),
        };
        notify(&scope);
        drop(inner);
        Some(scope)
    }

    /// The other members of the connection's room, if it is in one.
    /// `notify` runs under the store lock.
    pub fn peers_of<F>(&self, connection_id: ConnectionId, notify: F) -> Option<MemberScope>
    where
        F: FnOnce(&MemberScope),
    {
        let inner = self.inner.lock();
        let room = inner.rooms.get(inner.memberships.get(&connection_id)?)?;
        let scope = MemberScope {
            room_name: room.name.clone(),
            others: room.member_ids_except(connection_id),
        };
        notify(&scope);
        drop(inner);
        Some(scope)
    }

    pub fn find_participant(&self, connection_id: ConnectionId) -> Option<ParticipantInfo> {
        let inner = self.inner.lock();
        let room = inner.rooms.get(inner.memberships.get(&connection_id)?)?;
        room.participants.get(&connection_id).map(Participant::info)
    }

    pub fn room_exists(&self, name: &str) -> bool {
        room_key(name)
            .map(|key| self.inner.lock().rooms.contains_key(&key))
            .unwrap_or(false)
    }

    /// List all rooms
    pub fn list_rooms(&self) -> Vec<RoomInfo> {
        let mut rooms: Vec<RoomInfo> = self.inner.lock().rooms.values().map(Room::info).collect();
        rooms.sort_by(|a, b| a.name.cmp(&b.name));
        rooms
    }
}

#[cfg(test)]
impl RoomStore {
    fn roster(&self, name: &str) -> Option<Vec<ParticipantInfo>> {
        let key = room_key(name)?;
        let inner = self.inner.lock();
        let room = inner.rooms.get(&key)?;
        Some(room.participants.values().map(Participant::info).collect())
    }

    fn room_count(&self) -> usize {
        self.inner.lock().rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_create_room_trims_name() {
        let store = RoomStore::new();
        let room = store.create_room("  Standup  ").unwrap();
        assert_eq!(room.name, "Standup");
        assert_eq!(room.participants, 0);
        assert!(store.room_exists("standup"));
    }

    #[test]
    fn test_create_room_is_case_insensitive() {
        let store = RoomStore::new();
        store.create_room("Standup").unwrap();

        for variant in ["Standup", "standup", " STANDUP ", "\tStandUp\n"] {
            let result = store.create_room(variant);
            assert_eq!(result.unwrap_err(), RoomError::AlreadyExists("Standup".to_string()));
        }
        assert_eq!(store.room_count(), 1);
    }

    #[test]
    fn test_create_room_rejects_blank_name() {
        let store = RoomStore::new();
        assert!(matches!(store.create_room(""), Err(RoomError::InvalidInput(_))));
        assert!(matches!(store.create_room("   "), Err(RoomError::InvalidInput(_))));
        assert_eq!(store.room_count(), 0);
    }

    #[test]
    fn test_join_missing_room() {
        let store = RoomStore::new();
        let id = ConnectionId::new();

        let result = store.join_room("Nowhere", id, "alice", None, |_| {});
        assert_eq!(result.unwrap_err(), RoomError::NotFound("Nowhere".to_string()));
        assert!(store.find_participant(id).is_none());
        assert_eq!(store.room_count(), 0);
    }

    #[test]
    fn test_join_rejects_blank_display_name() {
        let store = RoomStore::new();
        store.create_room("Standup").unwrap();
        let result = store.join_room("Standup", ConnectionId::new(), "  ", None, |_| {});
        assert_eq!(result.unwrap_err(), RoomError::InvalidInput("Display name"));
    }

    #[test]
    fn test_join_returns_others() {
        let store = RoomStore::new();
        store.create_room("Standup").unwrap();

        let ids: Vec<ConnectionId> = (0..4).map(|_| ConnectionId::new()).collect();
        for (n, id) in ids.iter().enumerate() {
            let outcome = store
                .join_room(" standup ", *id, &format!("user{}", n), None, |_| {})
                .unwrap();
            assert_eq!(outcome.room_name, "Standup");
            assert_eq!(outcome.others.len(), n);
            assert!(outcome.others.iter().all(|p| p.id != *id));
            assert!(outcome.participant.camera_on);
            assert!(outcome.participant.mic_on);
        }

        assert_eq!(store.roster("STANDUP").unwrap().len(), 4);
    }

    #[test]
    fn test_join_twice_is_rejected() {
        let store = RoomStore::new();
        store.create_room("A").unwrap();
        store.create_room("B").unwrap();
        let id = ConnectionId::new();

        store.join_room("A", id, "alice", None, |_| {}).unwrap();
        let result = store.join_room("B", id, "alice", None, |_| {});
        assert_eq!(result.unwrap_err(), RoomError::AlreadyInRoom("A".to_string()));
        assert_eq!(store.roster("B").unwrap().len(), 0);
    }

    #[test]
    fn test_last_leave_removes_room() {
        let store = RoomStore::new();
        store.create_room("Standup").unwrap();
        let alice = ConnectionId::new();
        let bob = ConnectionId::new();
        store.join_room("Standup", alice, "alice", None, |_| {}).unwrap();
        store.join_room("Standup", bob, "bob", None, |_| {}).unwrap();

        let departure = store.leave_room(bob, |_| {}).unwrap();
        assert_eq!(departure.remaining, vec![alice]);
        assert!(!departure.room_removed);

        let departure = store.leave_room(alice, |_| {}).unwrap();
        assert!(departure.remaining.is_empty());
        assert!(departure.room_removed);
        assert!(!store.room_exists("Standup"));

        store.create_room("standup").unwrap();
    }

    #[test]
    fn test_leave_when_not_in_room() {
        let store = RoomStore::new();
        assert!(store.leave_room(ConnectionId::new(), |_| {}).is_none());
    }

    #[test]
    fn test_second_leave_is_noop() {
        let store = RoomStore::new();
        store.create_room("Standup").unwrap();
        let id = ConnectionId::new();
        store.join_room("Standup", id, "alice", None, |_| {}).unwrap();

        assert!(store.leave_room(id, |_| {}).is_some());
        assert!(store.leave_room(id, |_| {}).is_none());
    }

    #[test]
    fn test_toggle_state() {
        let store = RoomStore::new();
        store.create_room("Standup").unwrap();
        let alice = ConnectionId::new();
        let bob = ConnectionId::new();
        store.join_room("Standup", alice, "alice", None, |_| {}).unwrap();
        store.join_room("Standup", bob, "bob", None, |_| {}).unwrap();

        let scope = store.set_mic_state(bob, false, |_| {}).unwrap();
        assert_eq!(scope.room_name, "Standup");
        assert_eq!(scope.others, vec![alice]);

        let scope = store.set_camera_state(bob, false, |_| {}).unwrap();
        assert_eq!(scope.others, vec![alice]);

        let bob_info = store.find_participant(bob).unwrap();
        assert!(!bob_info.mic_on);
        assert!(!bob_info.camera_on);
        assert!(store.find_participant(alice).unwrap().mic_on);
    }

    #[test]
    fn test_toggle_without_room_is_noop() {
        let store = RoomStore::new();
        assert!(store.set_camera_state(ConnectionId::new(), false, |_| {}).is_none());
        assert!(store.set_mic_state(ConnectionId::new(), true, |_| {}).is_none());
    }

    #[test]
    fn test_list_rooms() {
        let store = RoomStore::new();
        store.create_room("Beta").unwrap();
        store.create_room("Alpha").unwrap();
        store
            .join_room("beta", ConnectionId::new(), "alice", Some("alice".to_string()), |_| {})
            .unwrap();

        let rooms = store.list_rooms();
        assert_eq!(rooms.len(), 2);
        assert_eq!(rooms[0].name, "Alpha");
        assert_eq!(rooms[1].participants, 1);
    }

    #[test]
    fn test_notify_runs_under_store_lock() {
        let store = RoomStore::new();
        store.create_room("Standup").unwrap();
        let alice = ConnectionId::new();
        let mut calls = 0;

        store
            .join_room("Standup", alice, "alice", None, |_| {
                assert!(store.inner.try_lock().is_none());
                calls += 1;
            })
            .unwrap();
        store.set_mic_state(alice, false, |_| {
            assert!(store.inner.try_lock().is_none());
            calls += 1;
        });
        store.peers_of(alice, |_| {
            assert!(store.inner.try_lock().is_none());
            calls += 1;
        });
        store.leave_room(alice, |_| {
            assert!(store.inner.try_lock().is_none());
            calls += 1;
        });

        assert_eq!(calls, 4);
        assert!(store.inner.try_lock().is_some());
    }

    #[test]
    fn test_notify_skipped_on_failure() {
        let store = RoomStore::new();
        let mut called = false;
        let _ = store.join_room("Nowhere", ConnectionId::new(), "alice", None, |_| called = true);
        store.leave_room(ConnectionId::new(), |_| called = true);
        store.set_camera_state(ConnectionId::new(), true, |_| called = true);
        assert!(!called);
    }

    #[test]
    fn test_concurrent_create_single_winner() {
        let store = Arc::new(RoomStore::new());
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let name = if n % 2 == 0 { "Race" } else { " race " };
                    store.create_room(name).is_ok()
                })
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(wins, 1);
    }

    #[test]
    fn test_concurrent_leave_removes_room_once() {
        let store = Arc::new(RoomStore::new());
        store.create_room("Race").unwrap();
        let ids: Vec<ConnectionId> = (0..8).map(|_| ConnectionId::new()).collect();
        for id in &ids {
            store.join_room("Race", *id, "user", None, |_| {}).unwrap();
        }

        let handles: Vec<_> = ids
            .iter()
            .map(|id| {
                let store = store.clone();
                let id = *id;
                std::thread::spawn(move || store.leave_room(id, |_| {}).map(|d| d.room_removed))
            })
            .collect();

        let removals = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .filter(|removed| *removed)
            .count();
        assert_eq!(removals, 1);
        assert_eq!(store.room_count(), 0);
    }
}
