//! Voice peer mesh owned by the local session: one negotiated session per remote user.
//!
//! Whoever sees `user_joined_voice` initiates toward the newcomer; the newcomer answers.
//! Negotiation payloads are opaque JSON produced by the local media stack.

use serde::Serialize;
use serde_json::value::RawValue;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::event::SignalKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    Initiator,
    Responder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    OfferSent,
    Connected,
    Closed,
}

#[derive(Debug, Clone)]
pub struct PeerSession {
    pub role: PeerRole,
    pub state: PeerState,
    pub remote_candidates: Vec<Box<RawValue>>,
}

impl PeerSession {
    fn new(role: PeerRole, state: PeerState) -> Self {
        Self {
            role,
            state,
            remote_candidates: Vec::new(),
        }
    }
}

/// A negotiation message to hand to the hub.
#[derive(Debug, Clone)]
pub struct OutboundSignal {
    pub to: Uuid,
    pub kind: SignalKind,
    pub payload: Box<RawValue>,
}

#[derive(Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
enum SignalFrame<'a> {
    VoiceOffer { to: Uuid, offer: &'a RawValue },
    VoiceAnswer { to: Uuid, answer: &'a RawValue },
    VoiceIceCandidate { to: Uuid, candidate: &'a RawValue },
}

impl OutboundSignal {
    pub fn to_frame(&self) -> AppResult<String> {
        let payload = self.payload.as_ref();
        let frame = match self.kind {
            SignalKind::Offer => SignalFrame::VoiceOffer {
                to: self.to,
                offer: payload,
            },
            SignalKind::Answer => SignalFrame::VoiceAnswer {
                to: self.to,
                answer: payload,
            },
            SignalKind::IceCandidate => SignalFrame::VoiceIceCandidate {
                to: self.to,
                candidate: payload,
            },
        };
        Ok(serde_json::to_string(&frame)?)
    }
}

pub struct PeerMesh {
    local_user: Uuid,
    peers: HashMap<Uuid, PeerSession>,
}

impl PeerMesh {
    pub fn new(local_user: Uuid) -> Self {
        Self {
            local_user,
            peers: HashMap::new(),
        }
    }

    pub fn peer(&self, user_id: &Uuid) -> Option<&PeerSession> {
        self.peers.get(user_id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// A remote user entered voice: open an initiator session and return the offer to send.
    /// Ignored for ourselves and for peers we already negotiate with.
    pub fn on_user_joined_voice(&mut self, user_id: Uuid, offer: Box<RawValue>) -> Option<OutboundSignal> {
        if user_id == self.local_user || self.peers.contains_key(&user_id) {
            return None;
        }
        self.peers
            .insert(user_id, PeerSession::new(PeerRole::Initiator, PeerState::OfferSent));
        debug!(peer = %user_id, "offer sent");
        Some(OutboundSignal {
            to: user_id,
            kind: SignalKind::Offer,
            payload: offer,
        })
    }

    /// A remote offer arrived: answer it. A fresh offer replaces any earlier session with that peer.
    pub fn on_offer(&mut self, from: Uuid, answer: Box<RawValue>) -> Option<OutboundSignal> {
        if from == self.local_user {
            return None;
        }
        self.peers
            .insert(from, PeerSession::new(PeerRole::Responder, PeerState::Connected));
        Some(OutboundSignal {
            to: from,
            kind: SignalKind::Answer,
            payload: answer,
        })
    }

    /// Completes an initiator session. Returns false for unknown peers or unexpected answers.
    pub fn on_answer(&mut self, from: Uuid) -> bool {
        match self.peers.get_mut(&from) {
            Some(session) if session.role == PeerRole::Initiator && session.state == PeerState::OfferSent => {
                session.state = PeerState::Connected;
                true
            }
            _ => false,
        }
    }

    /// Queue a remote candidate. Candidates from unknown peers are dropped.
    pub fn on_ice_candidate(&mut self, from: Uuid, candidate: Box<RawValue>) -> bool {
        match self.peers.get_mut(&from) {
            Some(session) if session.state != PeerState::Closed => {
                session.remote_candidates.push(candidate);
                true
            }
            _ => {
                debug!(peer = %from, "candidate for unknown peer dropped");
                false
            }
        }
    }

    /// A local candidate is trickled to every open peer.
    pub fn local_candidate(&self, candidate: &RawValue) -> Vec<OutboundSignal> {
        self.peers
            .iter()
            .filter(|(_, s)| s.state != PeerState::Closed)
            .map(|(user_id, _)| OutboundSignal {
                to: *user_id,
                kind: SignalKind::IceCandidate,
                payload: candidate.to_owned(),
            })
            .collect()
    }

    /// `user_left_voice`: tear down the session with that peer.
    pub fn remove_peer(&mut self, user_id: &Uuid) -> Option<PeerSession> {
        self.peers.remove(user_id).map(|mut session| {
            session.state = PeerState::Closed;
            session
        })
    }

    /// Close every session and clear the mesh. Returns how many were closed.
    pub fn leave(&mut self) -> usize {
        let closed = self.peers.len();
        for session in self.peers.values_mut() {
            session.state = PeerState::Closed;
        }
        self.peers.clear();
        closed
    }
}
