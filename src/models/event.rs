//! Wire protocol: inbound client events and outbound server events.
//!
//! Every frame is a JSON text frame of the form `{"event": <name>, "data": <payload>}`.
//! Inbound frames are decoded in two steps: the envelope first, then the payload
//! for the named event. Signaling payloads stay as raw JSON so they are relayed
//! exactly as the sender wrote them.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::chat::ChatMessage;
use crate::models::room::{RoomId, RoomSnapshot};
use crate::services::playback::PlaybackCommand;

/// Names of every event a client may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEventName {
    SendMessage,
    JoinWatchRoom,
    LeaveWatchRoom,
    VideoChange,
    VideoSync,
    JoinVoice,
    LeaveVoice,
    VoiceOffer,
    VoiceAnswer,
    VoiceIceCandidate,
    Ping,
}

impl FromStr for ClientEventName {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "send_message" => Self::SendMessage,
            "join_watch_room" => Self::JoinWatchRoom,
            "leave_watch_room" => Self::LeaveWatchRoom,
            "video_change" => Self::VideoChange,
            "video_sync" => Self::VideoSync,
            "join_voice" => Self::JoinVoice,
            "leave_voice" => Self::LeaveVoice,
            "voice_offer" => Self::VoiceOffer,
            "voice_answer" => Self::VoiceAnswer,
            "voice_ice_candidate" => Self::VoiceIceCandidate,
            "ping" => Self::Ping,
            other => return Err(AppError::InvalidMessage(format!("unknown event: {}", other))),
        })
    }
}

/// Playback transition carried by `video_sync`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncKind {
    Play,
    Pause,
    Seek,
}

/// Chat events.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    Send { to: Uuid, content: String },
}

/// Watch room membership events.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomCommand {
    Join(RoomId),
    Leave(RoomId),
}

/// Shared playback events for one room.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncCommand {
    pub room_id: RoomId,
    pub command: PlaybackCommand,
}

/// Which WebRTC negotiation message is being relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

/// Voice membership and peer-to-peer negotiation events.
#[derive(Debug, Clone)]
pub enum SignalCommand {
    JoinVoice(RoomId),
    LeaveVoice(RoomId),
    Relay {
        to: Uuid,
        kind: SignalKind,
        payload: Box<RawValue>,
    },
}

/// Every inbound event, grouped by concern.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Chat(ChatCommand),
    Room(RoomCommand),
    Sync(SyncCommand),
    Signal(SignalCommand),
    Ping,
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Option<Box<RawValue>>,
}

/// Room reference: either `"room"` or `{"roomId": "room"}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RoomRef {
    Bare(String),
    Object {
        #[serde(rename = "roomId")]
        room_id: String,
    },
}

impl RoomRef {
    fn into_room_id(self) -> AppResult<RoomId> {
        match self {
            RoomRef::Bare(id) | RoomRef::Object { room_id: id } => RoomId::parse(&id),
        }
    }
}

#[derive(Deserialize)]
struct SendMessagePayload {
    to: Uuid,
    content: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoChangePayload {
    room_id: String,
    url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoSyncPayload {
    room_id: String,
    #[serde(rename = "type")]
    kind: SyncKind,
    #[serde(default)]
    played: bool,
    timestamp: f64,
}

#[derive(Deserialize)]
struct OfferPayload {
    to: Uuid,
    offer: Box<RawValue>,
}

#[derive(Deserialize)]
struct AnswerPayload {
    to: Uuid,
    answer: Box<RawValue>,
}

#[derive(Deserialize)]
struct IceCandidatePayload {
    to: Uuid,
    candidate: Box<RawValue>,
}

fn payload<'a, T: Deserialize<'a>>(name: &str, data: Option<&'a RawValue>) -> AppResult<T> {
    let raw = data.ok_or_else(|| AppError::InvalidMessage(format!("{} requires data", name)))?;
    serde_json::from_str(raw.get())
        .map_err(|e| AppError::InvalidMessage(format!("malformed {} payload: {}", name, e)))
}

impl ClientEvent {
    /// Decode one inbound text frame.
    pub fn parse(text: &str) -> AppResult<Self> {
        let envelope: Envelope = serde_json::from_str(text)
            .map_err(|e| AppError::InvalidMessage(format!("malformed frame: {}", e)))?;
        let name: ClientEventName = envelope.event.parse()?;
        let data = envelope.data.as_deref();
        let event = envelope.event.as_str();

        let parsed = match name {
            ClientEventName::SendMessage => {
                let p: SendMessagePayload = payload(event, data)?;
                ClientEvent::Chat(ChatCommand::Send {
                    to: p.to,
                    content: p.content,
                })
            }
            ClientEventName::JoinWatchRoom => {
                let r: RoomRef = payload(event, data)?;
                ClientEvent::Room(RoomCommand::Join(r.into_room_id()?))
            }
            ClientEventName::LeaveWatchRoom => {
                let r: RoomRef = payload(event, data)?;
                ClientEvent::Room(RoomCommand::Leave(r.into_room_id()?))
            }
            ClientEventName::VideoChange => {
                let p: VideoChangePayload = payload(event, data)?;
                ClientEvent::Sync(SyncCommand {
                    room_id: RoomId::parse(&p.room_id)?,
                    command: PlaybackCommand::Load { url: p.url },
                })
            }
            ClientEventName::VideoSync => {
                let p: VideoSyncPayload = payload(event, data)?;
                let command = match p.kind {
                    SyncKind::Play => PlaybackCommand::Play {
                        position: p.timestamp,
                    },
                    SyncKind::Pause => PlaybackCommand::Pause {
                        position: p.timestamp,
                    },
                    SyncKind::Seek => PlaybackCommand::Seek {
                        position: p.timestamp,
                        playing: p.played,
                    },
                };
                ClientEvent::Sync(SyncCommand {
                    room_id: RoomId::parse(&p.room_id)?,
                    command,
                })
            }
            ClientEventName::JoinVoice => {
                let r: RoomRef = payload(event, data)?;
                ClientEvent::Signal(SignalCommand::JoinVoice(r.into_room_id()?))
            }
            ClientEventName::LeaveVoice => {
                let r: RoomRef = payload(event, data)?;
                ClientEvent::Signal(SignalCommand::LeaveVoice(r.into_room_id()?))
            }
            ClientEventName::VoiceOffer => {
                let p: OfferPayload = payload(event, data)?;
                ClientEvent::Signal(SignalCommand::Relay {
                    to: p.to,
                    kind: SignalKind::Offer,
                    payload: p.offer,
                })
            }
            ClientEventName::VoiceAnswer => {
                let p: AnswerPayload = payload(event, data)?;
                ClientEvent::Signal(SignalCommand::Relay {
                    to: p.to,
                    kind: SignalKind::Answer,
                    payload: p.answer,
                })
            }
            ClientEventName::VoiceIceCandidate => {
                let p: IceCandidatePayload = payload(event, data)?;
                ClientEvent::Signal(SignalCommand::Relay {
                    to: p.to,
                    kind: SignalKind::IceCandidate,
                    payload: p.candidate,
                })
            }
            ClientEventName::Ping => ClientEvent::Ping,
        };
        Ok(parsed)
    }
}

/// Event sent over WebSocket to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    ConnectionEstablished {
        socket_id: String,
        user_id: Uuid,
        display_name: String,
    },
    #[serde(rename_all = "camelCase")]
    UserOnline { user_id: Uuid },
    #[serde(rename_all = "camelCase")]
    UserOffline { user_id: Uuid },
    ReceiveMessage(ChatMessage),
    MessageSent(ChatMessage),
    MessageFailed { to: Uuid, reason: String },
    #[serde(rename_all = "camelCase")]
    UserJoinedRoom {
        room_id: RoomId,
        user_id: Uuid,
        username: String,
    },
    #[serde(rename_all = "camelCase")]
    UserLeftRoom { room_id: RoomId, user_id: Uuid },
    RoomState(RoomSnapshot),
    #[serde(rename_all = "camelCase")]
    VideoChange {
        room_id: RoomId,
        url: String,
        by: String,
    },
    #[serde(rename_all = "camelCase")]
    VideoSync {
        room_id: RoomId,
        #[serde(rename = "type")]
        kind: SyncKind,
        played: bool,
        timestamp: f64,
        by: String,
    },
    #[serde(rename_all = "camelCase")]
    UserJoinedVoice { room_id: RoomId, user_id: Uuid },
    #[serde(rename_all = "camelCase")]
    UserLeftVoice { room_id: RoomId, user_id: Uuid },
    VoiceOffer { from: Uuid, offer: Box<RawValue> },
    VoiceAnswer { from: Uuid, answer: Box<RawValue> },
    VoiceIceCandidate { from: Uuid, candidate: Box<RawValue> },
    Pong,
}

impl ServerEvent {
    /// Relayed negotiation message, tagged with the sender.
    pub fn signal(kind: SignalKind, from: Uuid, payload: Box<RawValue>) -> Self {
        match kind {
            SignalKind::Offer => ServerEvent::VoiceOffer {
                from,
                offer: payload,
            },
            SignalKind::Answer => ServerEvent::VoiceAnswer {
                from,
                answer: payload,
            },
            SignalKind::IceCandidate => ServerEvent::VoiceIceCandidate {
                from,
                candidate: payload,
            },
        }
    }

    pub fn to_frame(&self) -> AppResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}
