use std::sync::Arc;

use uuid::Uuid;
use webrtc::{
    ice_transport::ice_candidate::RTCIceCandidateInit,
    peer_connection::sdp::{sdp_type::RTCSdpType, session_description::RTCSessionDescription},
};

use crate::{
    connection::TransportState,
    protocol::{ParticipantId, SignalPayload},
    track::{LocalTrack, RemoteStream},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerState {
    New,
    Negotiating,
    Connected,
    Closed,
    Failed,
}

impl PeerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PeerState::Closed | PeerState::Failed)
    }
}

/// Side effects requested by a [`PeerConnection`].
///
/// `SendSignal` goes to the signaling channel and `Release` drops the driver. Everything else runs on the
/// media connection, in emission order.
#[derive(Clone, Debug)]
pub enum Action {
    AttachTrack(Arc<LocalTrack>),
    ReplaceTrack(Arc<LocalTrack>),
    CreateOffer,
    CreateAnswer,
    ApplyRemoteDescription(RTCSessionDescription),
    AddIceCandidate(RTCIceCandidateInit),
    SendSignal(SignalPayload),
    Release,
}

/// Negotiation state towards one remote participant. Performs no I/O.
#[derive(Debug)]
pub struct PeerConnection {
    participant_id: ParticipantId,
    connection_id: String,
    state: PeerState,
    offered: bool,
    remote_description_applied: bool,
    pending_candidates: Vec<RTCIceCandidateInit>,
    remote_stream: Option<RemoteStream>,
}

impl PeerConnection {
    /// A fresh connection with every local track attached, so the first offer carries them.
    pub fn new(participant_id: ParticipantId, tracks: &[Arc<LocalTrack>]) -> (Self, Vec<Action>) {
        let peer = Self {
            participant_id,
            connection_id: Uuid::new_v4().to_string(),
            state: PeerState::New,
            offered: false,
            remote_description_applied: false,
            pending_candidates: vec![],
            remote_stream: None,
        };
        let actions = tracks
            .iter()
            .map(|track| Action::AttachTrack(Arc::clone(track)))
            .collect();

        tracing::debug!(
            "PeerConnection {} for {} is created",
            peer.connection_id,
            peer.participant_id
        );
        (peer, actions)
    }

    pub fn participant_id(&self) -> &ParticipantId {
        &self.participant_id
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn state(&self) -> PeerState {
        self.state
    }

    pub fn remote_stream(&self) -> Option<&RemoteStream> {
        self.remote_stream.as_ref()
    }

    /// Issue the offer. Only a connection that has neither offered nor received an offer may do so.
    pub fn start_negotiation(&mut self) -> Vec<Action> {
        if self.state != PeerState::New || self.remote_description_applied {
            tracing::debug!(
                "{} is {:?}, not starting negotiation",
                self.participant_id,
                self.state
            );
            return vec![];
        }
        tracing::info!("offering to {}", self.participant_id);
        self.state = PeerState::Negotiating;
        self.offered = true;
        vec![Action::CreateOffer]
    }

    pub fn handle_signal(&mut self, payload: SignalPayload) -> Vec<Action> {
        if self.state.is_terminal() {
            return vec![];
        }
        match payload {
            SignalPayload::Sdp(sdp) => self.handle_remote_description(sdp),
            SignalPayload::Ice(candidate) => {
                if self.remote_description_applied {
                    vec![Action::AddIceCandidate(candidate)]
                } else {
                    tracing::debug!("queueing ICE candidate from {}", self.participant_id);
                    self.pending_candidates.push(candidate);
                    vec![]
                }
            }
        }
    }

    fn handle_remote_description(&mut self, sdp: RTCSessionDescription) -> Vec<Action> {
        match sdp.sdp_type {
            RTCSdpType::Offer => {
                if self.offered || self.remote_description_applied {
                    tracing::warn!(
                        "ignoring offer from {} in state {:?}",
                        self.participant_id,
                        self.state
                    );
                    return vec![];
                }
                self.state = PeerState::Negotiating;
                let mut actions = self.apply_remote_description(sdp);
                actions.push(Action::CreateAnswer);
                actions
            }
            RTCSdpType::Answer => {
                if !self.offered || self.remote_description_applied {
                    tracing::warn!("ignoring unsolicited answer from {}", self.participant_id);
                    return vec![];
                }
                self.apply_remote_description(sdp)
            }
            other => {
                tracing::debug!("ignoring {} description from {}", other, self.participant_id);
                vec![]
            }
        }
    }

    fn apply_remote_description(&mut self, sdp: RTCSessionDescription) -> Vec<Action> {
        self.remote_description_applied = true;
        let mut actions = vec![Action::ApplyRemoteDescription(sdp)];
        actions.extend(
            self.pending_candidates
                .drain(..)
                .map(Action::AddIceCandidate),
        );
        actions
    }

    pub fn handle_local_description(&mut self, sdp: RTCSessionDescription) -> Vec<Action> {
        if self.state.is_terminal() {
            return vec![];
        }
        vec![Action::SendSignal(SignalPayload::Sdp(sdp))]
    }

    pub fn handle_local_candidate(&mut self, candidate: RTCIceCandidateInit) -> Vec<Action> {
        if self.state.is_terminal() {
            return vec![];
        }
        vec![Action::SendSignal(SignalPayload::Ice(candidate))]
    }

    /// Store the stream the remote side sends us. Returns whether anything observable changed.
    pub fn handle_remote_stream(&mut self, stream: RemoteStream) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        if self.state != PeerState::Connected {
            tracing::info!("{} is connected", self.participant_id);
        }
        self.state = PeerState::Connected;
        self.remote_stream = Some(stream);
        true
    }

    pub fn handle_transport_state(&mut self, state: TransportState) -> Vec<Action> {
        match state {
            TransportState::Failed => self.fail("transport failed"),
            TransportState::Disconnected => {
                tracing::warn!("{} transport is disconnected", self.participant_id);
                vec![]
            }
            _ => vec![],
        }
    }

    pub fn replace_track(&mut self, track: Arc<LocalTrack>) -> Vec<Action> {
        if self.state.is_terminal() {
            return vec![];
        }
        vec![Action::ReplaceTrack(track)]
    }

    pub fn fail(&mut self, reason: &str) -> Vec<Action> {
        if self.state.is_terminal() {
            return vec![];
        }
        tracing::error!("connection to {} failed: {}", self.participant_id, reason);
        self.state = PeerState::Failed;
        vec![Action::Release]
    }

    pub fn close(&mut self) -> Vec<Action> {
        if self.state.is_terminal() {
            return vec![];
        }
        tracing::debug!("closing connection to {}", self.participant_id);
        self.state = PeerState::Closed;
        vec![Action::Release]
    }
}
