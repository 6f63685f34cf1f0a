use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use webrtc::{
    ice_transport::ice_candidate::RTCIceCandidateInit,
    peer_connection::{
        peer_connection_state::RTCPeerConnectionState,
        sdp::session_description::RTCSessionDescription,
    },
};

use crate::{error::Error, protocol::ParticipantId, track::LocalTrack, track::RemoteStream};

/// One media transport to one remote participant.
///
/// Calls arrive one at a time, in the order the state machine emitted them.
#[async_trait]
pub trait MediaConnection: Send + Sync {
    async fn add_track(&self, track: Arc<LocalTrack>) -> Result<(), Error>;

    /// Swap the sender of `track.kind` without renegotiating.
    async fn replace_track(&self, track: Arc<LocalTrack>) -> Result<(), Error>;

    /// Create an offer, set it as local description and return it.
    async fn create_offer(&self) -> Result<RTCSessionDescription, Error>;

    /// Create an answer, set it as local description and return it.
    async fn create_answer(&self) -> Result<RTCSessionDescription, Error>;

    async fn set_remote_description(&self, sdp: RTCSessionDescription) -> Result<(), Error>;

    async fn add_ice_candidate(&self, candidate: RTCIceCandidateInit) -> Result<(), Error>;

    async fn close(&self) -> Result<(), Error>;
}

#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn create(&self, events: ConnectionEvents) -> Result<Arc<dyn MediaConnection>, Error>;
}

/// What a connection reports back to the registry.
#[derive(Clone, Debug)]
pub enum ConnectionEvent {
    LocalDescription(RTCSessionDescription),
    LocalCandidate(RTCIceCandidateInit),
    RemoteStream(RemoteStream),
    StateChanged(TransportState),
    Failed(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl From<RTCPeerConnectionState> for TransportState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::Connecting => TransportState::Connecting,
            RTCPeerConnectionState::Connected => TransportState::Connected,
            RTCPeerConnectionState::Disconnected => TransportState::Disconnected,
            RTCPeerConnectionState::Failed => TransportState::Failed,
            RTCPeerConnectionState::Closed => TransportState::Closed,
            _ => TransportState::New,
        }
    }
}

#[derive(Debug)]
pub struct ConnectionNotice {
    pub participant_id: ParticipantId,
    pub connection_id: String,
    pub event: ConnectionEvent,
}

/// Sender handed to a connection; tags every event with the connection it came from.
#[derive(Clone, Debug)]
pub struct ConnectionEvents {
    pub participant_id: ParticipantId,
    pub connection_id: String,
    sender: mpsc::UnboundedSender<ConnectionNotice>,
}

impl ConnectionEvents {
    pub fn new(
        participant_id: ParticipantId,
        connection_id: String,
        sender: mpsc::UnboundedSender<ConnectionNotice>,
    ) -> Self {
        Self {
            participant_id,
            connection_id,
            sender,
        }
    }

    pub fn emit(&self, event: ConnectionEvent) {
        let notice = ConnectionNotice {
            participant_id: self.participant_id.clone(),
            connection_id: self.connection_id.clone(),
            event,
        };
        if self.sender.send(notice).is_err() {
            tracing::debug!(
                "connection {} outlived its call, event dropped",
                self.connection_id
            );
        }
    }
}
