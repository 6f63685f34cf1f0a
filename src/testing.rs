//! In-crate fakes for the collaborator traits.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};
use webrtc::{
    ice_transport::ice_candidate::RTCIceCandidateInit,
    peer_connection::sdp::{sdp_type::RTCSdpType, session_description::RTCSessionDescription},
};

use crate::{
    connection::{
        ConnectionEvent, ConnectionEvents, ConnectionFactory, ConnectionNotice, MediaConnection,
        TransportState,
    },
    error::{ConnectionErrorKind, Error, MediaErrorKind},
    media::{MediaDevices, LOCAL_STREAM_ID},
    protocol::{ParticipantId, SignalPayload},
    signaling::{SignalingChannel, SignalingEvents},
    track::{LocalTrack, MediaKind, RemoteStream, RemoteTrack, TrackSource},
};

pub fn description(sdp_type: RTCSdpType, sdp: &str) -> RTCSessionDescription {
    let mut description = RTCSessionDescription::default();
    description.sdp_type = sdp_type;
    description.sdp = sdp.to_owned();
    description
}

pub fn candidate(candidate: &str) -> RTCIceCandidateInit {
    RTCIceCandidateInit {
        candidate: candidate.to_owned(),
        ..Default::default()
    }
}

pub async fn next_notice(rx: &mut mpsc::UnboundedReceiver<ConnectionNotice>) -> ConnectionNotice {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a connection event")
        .expect("connection events closed")
}

#[derive(Debug, Default)]
pub struct FakeDevices {
    camera: bool,
    microphone: bool,
    display: bool,
    display_gate: Option<Arc<Notify>>,
}

impl FakeDevices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_camera(mut self) -> Self {
        self.camera = true;
        self
    }

    pub fn with_microphone(mut self) -> Self {
        self.microphone = true;
        self
    }

    pub fn with_display(mut self) -> Self {
        self.display = true;
        self
    }

    /// Display capture succeeds, but only after `gate` is notified.
    pub fn with_display_gate(mut self, gate: Arc<Notify>) -> Self {
        self.display = true;
        self.display_gate = Some(gate);
        self
    }
}

#[async_trait]
impl MediaDevices for FakeDevices {
    async fn capture(&self, kind: MediaKind) -> Result<Arc<LocalTrack>, Error> {
        let (available, source) = match kind {
            MediaKind::Video => (self.camera, TrackSource::Camera),
            MediaKind::Audio => (self.microphone, TrackSource::Microphone),
        };
        if !available {
            return Err(Error::new_media(
                format!("{:?} denied", kind),
                MediaErrorKind::PermissionDeniedError,
            ));
        }
        Ok(LocalTrack::new(kind, source, LOCAL_STREAM_ID, true))
    }

    async fn capture_display(&self) -> Result<Arc<LocalTrack>, Error> {
        if let Some(gate) = &self.display_gate {
            gate.notified().await;
        }
        if !self.display {
            return Err(Error::new_media(
                "display denied".to_string(),
                MediaErrorKind::PermissionDeniedError,
            ));
        }
        Ok(LocalTrack::new(
            MediaKind::Video,
            TrackSource::Screen,
            LOCAL_STREAM_ID,
            true,
        ))
    }

    fn display_capture_supported(&self) -> bool {
        self.display
    }
}

/// Counters shared by every connection a [`FakeFactory`] creates.
#[derive(Debug, Default)]
pub struct FakeStats {
    pub offers: AtomicUsize,
    pub answers: AtomicUsize,
    pub replaced: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

impl FakeStats {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn offers(&self) -> usize {
        self.offers.load(Ordering::SeqCst)
    }

    pub fn answers(&self) -> usize {
        self.answers.load(Ordering::SeqCst)
    }

    pub fn replaced(&self) -> usize {
        self.replaced.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
pub struct FakeFactory {
    stats: Arc<FakeStats>,
    fail_remote_description: bool,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_remote_description(mut self) -> Self {
        self.fail_remote_description = true;
        self
    }

    pub fn stats(&self) -> Arc<FakeStats> {
        Arc::clone(&self.stats)
    }
}

#[async_trait]
impl ConnectionFactory for FakeFactory {
    async fn create(&self, events: ConnectionEvents) -> Result<Arc<dyn MediaConnection>, Error> {
        Ok(Arc::new(FakeConnection {
            events,
            stats: Arc::clone(&self.stats),
            fail_remote_description: self.fail_remote_description,
            local_set: AtomicBool::new(false),
            remote_set: AtomicBool::new(false),
            candidates: AtomicUsize::new(0),
        }))
    }
}

/// Behaves like a connection whose transport always succeeds: a local candidate follows each local
/// description and the remote stream shows up once both descriptions are set.
#[derive(Debug)]
pub struct FakeConnection {
    events: ConnectionEvents,
    stats: Arc<FakeStats>,
    fail_remote_description: bool,
    local_set: AtomicBool,
    remote_set: AtomicBool,
    candidates: AtomicUsize,
}

impl FakeConnection {
    fn local_description(&self, sdp_type: RTCSdpType) -> RTCSessionDescription {
        self.local_set.store(true, Ordering::SeqCst);
        let n = self.candidates.fetch_add(1, Ordering::SeqCst);
        self.events.emit(ConnectionEvent::LocalCandidate(candidate(&format!(
            "candidate:{}-{}",
            self.events.connection_id, n
        ))));
        self.maybe_connected();
        description(sdp_type, &format!("{} from {}", sdp_type, self.events.connection_id))
    }

    fn maybe_connected(&self) {
        if self.local_set.load(Ordering::SeqCst) && self.remote_set.load(Ordering::SeqCst) {
            let mut stream = RemoteStream::new(self.events.participant_id.as_str());
            stream.add_track(RemoteTrack::detached("remote-video", MediaKind::Video));
            stream.add_track(RemoteTrack::detached("remote-audio", MediaKind::Audio));
            self.events.emit(ConnectionEvent::RemoteStream(stream));
            self.events
                .emit(ConnectionEvent::StateChanged(TransportState::Connected));
        }
    }
}

#[async_trait]
impl MediaConnection for FakeConnection {
    async fn add_track(&self, track: Arc<LocalTrack>) -> Result<(), Error> {
        self.stats.record(format!("add_track {:?}", track.kind));
        Ok(())
    }

    async fn replace_track(&self, track: Arc<LocalTrack>) -> Result<(), Error> {
        self.stats.record(format!("replace_track {:?}", track.kind));
        self.stats.replaced.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn create_offer(&self) -> Result<RTCSessionDescription, Error> {
        self.stats.record("create_offer".to_owned());
        self.stats.offers.fetch_add(1, Ordering::SeqCst);
        Ok(self.local_description(RTCSdpType::Offer))
    }

    async fn create_answer(&self) -> Result<RTCSessionDescription, Error> {
        self.stats.record("create_answer".to_owned());
        self.stats.answers.fetch_add(1, Ordering::SeqCst);
        Ok(self.local_description(RTCSdpType::Answer))
    }

    async fn set_remote_description(&self, sdp: RTCSessionDescription) -> Result<(), Error> {
        self.stats.record(format!("set_remote {}", sdp.sdp_type));
        if self.fail_remote_description {
            return Err(Error::new_connection(
                "remote description rejected".to_string(),
                ConnectionErrorKind::PeerConnectionError,
            ));
        }
        self.remote_set.store(true, Ordering::SeqCst);
        self.maybe_connected();
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: RTCIceCandidateInit) -> Result<(), Error> {
        self.stats.record(format!("add_ice {}", candidate.candidate));
        Ok(())
    }

    async fn close(&self) -> Result<(), Error> {
        self.stats.record("close".to_owned());
        self.events
            .emit(ConnectionEvent::StateChanged(TransportState::Closed));
        Ok(())
    }
}

/// Records outgoing messages instead of sending them.
#[derive(Debug, Default)]
pub struct RecordingSignaling {
    signals: Mutex<Vec<(ParticipantId, SignalPayload)>>,
}

impl RecordingSignaling {
    pub fn signals(&self) -> Vec<(ParticipantId, SignalPayload)> {
        self.signals.lock().unwrap().clone()
    }

    pub fn offers_to(&self, to: &ParticipantId) -> usize {
        self.signals()
            .iter()
            .filter(|(id, payload)| {
                id == to
                    && matches!(payload, SignalPayload::Sdp(sdp) if sdp.sdp_type == RTCSdpType::Offer)
            })
            .count()
    }
}

#[async_trait]
impl SignalingChannel for RecordingSignaling {
    async fn connect(&self, _room: &str) -> Result<(ParticipantId, SignalingEvents), Error> {
        let (_tx, rx) = mpsc::unbounded_channel();
        Ok((ParticipantId::generate(), rx))
    }

    fn send_signal(&self, to: &ParticipantId, payload: SignalPayload) -> Result<(), Error> {
        self.signals.lock().unwrap().push((to.clone(), payload));
        Ok(())
    }

    fn send_chat(&self, _body: &str, _sender_name: &str) -> Result<(), Error> {
        Ok(())
    }
}
