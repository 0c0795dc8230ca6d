//! Signaling Protocol
//!
//! Defines the message format for client-server signaling. Every frame on the
//! wire is a 4-byte big-endian length prefix followed by a JSON document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::registry::ConnectionId;

/// Signaling messages exchanged between client and server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalingMessage {
    // Client -> Server
    Authenticate {
        account: String,
        password: String,
    },
    ListRooms,
    CreateRoom {
        name: String,
    },
    JoinRoom {
        room_name: String,
        display_name: String,
    },
    LeaveRoom,
    ToggleCamera {
        enabled: bool,
    },
    ToggleMic {
        enabled: bool,
    },
    UpdateTalking {
        talking: bool,
    },
    SendOffer {
        target_id: ConnectionId,
        payload: Value,
        #[serde(default)]
        room_name: Option<String>,
    },
    SendAnswer {
        target_id: ConnectionId,
        payload: Value,
        #[serde(default)]
        room_name: Option<String>,
    },
    SendIceCandidate {
        target_id: ConnectionId,
        payload: Value,
        #[serde(default)]
        room_name: Option<String>,
    },

    // Server -> Client
    Welcome {
        connection_id: ConnectionId,
    },
    AuthenticateResponse {
        success: bool,
        account: Option<String>,
        error: Option<String>,
    },
    RoomList {
        rooms: Vec<RoomInfo>,
    },
    RoomCreated {
        success: bool,
        room_id: Option<String>,
        room_name: Option<String>,
        error: Option<String>,
    },
    RoomJoined {
        success: bool,
        connection_id: Option<ConnectionId>,
        room_name: Option<String>,
        participants: Option<Vec<ParticipantInfo>>,
        error: Option<String>,
    },
    RoomLeft {
        success: bool,
        error: Option<String>,
    },
    ParticipantJoined {
        participant: ParticipantInfo,
    },
    ParticipantLeft {
        participant_id: ConnectionId,
    },
    CameraToggled {
        participant_id: ConnectionId,
        enabled: bool,
    },
    MicToggled {
        participant_id: ConnectionId,
        enabled: bool,
    },
    ParticipantTalking {
        participant_id: ConnectionId,
        talking: bool,
    },
    ReceiveOffer {
        sender_id: ConnectionId,
        payload: Value,
    },
    ReceiveAnswer {
        sender_id: ConnectionId,
        payload: Value,
    },
    ReceiveIceCandidate {
        sender_id: ConnectionId,
        payload: Value,
    },

    Error {
        message: String,
    },
}

/// Information about a room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomInfo {
    pub id: String,
    pub name: String,
    pub participants: u32,
}

/// Information about a participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub id: ConnectionId,
    pub display_name: String,
    #[serde(default)]
    pub account: Option<String>,
    pub camera_on: bool,
    pub mic_on: bool,
    pub joined_at: DateTime<Utc>,
}

/// Wire codec errors
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Frame of {size} bytes exceeds limit of {limit} bytes")]
    TooLarge { size: usize, limit: usize },
    #[error("Invalid message: {0}")]
    Json(#[from] serde_json::Error),
}

impl SignalingMessage {
    /// Serialize the message to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize a message from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Create a framed message with length prefix (4 bytes, big-endian)
    pub fn to_framed(&self) -> Result<Vec<u8>, serde_json::Error> {
        let data = self.to_bytes()?;
        let len = (data.len() as u32).to_be_bytes();
        let mut framed = Vec::with_capacity(4 + data.len());
        framed.extend_from_slice(&len);
        framed.extend_from_slice(&data);
        Ok(framed)
    }

    /// Short name of the message kind, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Authenticate { .. } => "authenticate",
            Self::ListRooms => "list_rooms",
            Self::CreateRoom { .. } => "create_room",
            Self::JoinRoom { .. } => "join_room",
            Self::LeaveRoom => "leave_room",
            Self::ToggleCamera { .. } => "toggle_camera",
            Self::ToggleMic { .. } => "toggle_mic",
            Self::UpdateTalking { .. } => "update_talking",
            Self::SendOffer { .. } => "send_offer",
            Self::SendAnswer { .. } => "send_answer",
            Self::SendIceCandidate { .. } => "send_ice_candidate",
            Self::Welcome { .. } => "welcome",
            Self::AuthenticateResponse { .. } => "authenticate_response",
            Self::RoomList { .. } => "room_list",
            Self::RoomCreated { .. } => "room_created",
            Self::RoomJoined { .. } => "room_joined",
            Self::RoomLeft { .. } => "room_left",
            Self::ParticipantJoined { .. } => "participant_joined",
            Self::ParticipantLeft { .. } => "participant_left",
            Self::CameraToggled { .. } => "camera_toggled",
            Self::MicToggled { .. } => "mic_toggled",
            Self::ParticipantTalking { .. } => "participant_talking",
            Self::ReceiveOffer { .. } => "receive_offer",
            Self::ReceiveAnswer { .. } => "receive_answer",
            Self::ReceiveIceCandidate { .. } => "receive_ice_candidate",
            Self::Error { .. } => "error",
        }
    }
}

/// Read one length-prefixed frame body.
///
/// Returns `Ok(None)` when the stream ends cleanly between frames. A stream
/// that ends inside the length prefix or the body is an `UnexpectedEof` error.
pub async fn read_frame<R>(reader: &mut R, limit: usize) -> Result<Option<Vec<u8>>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < len_buf.len() {
        match reader.read(&mut len_buf[filled..]).await? {
            0 if filled == 0 => return Ok(None),
            0 => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("stream closed after {} of 4 length prefix bytes", filled),
                )
                .into())
            }
            n => filled += n,
        }
    }

    let size = u32::from_be_bytes(len_buf) as usize;
    if size > limit {
        return Err(FrameError::TooLarge { size, limit });
    }

    let mut body = vec![0u8; size];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}
