use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use derivative::Derivative;
use enclose::enc;
use tokio::sync::Mutex;
use webrtc::{
    api::{media_engine::MediaEngine, APIBuilder},
    ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit},
    peer_connection::{
        peer_connection_state::RTCPeerConnectionState,
        sdp::session_description::RTCSessionDescription, RTCPeerConnection,
    },
    rtp_transceiver::{rtp_receiver::RTCRtpReceiver, rtp_sender::RTCRtpSender, RTCRtpTransceiver},
    track::track_remote::TrackRemote,
};

use crate::{
    config::MeshConfig,
    connection::{ConnectionEvent, ConnectionEvents, ConnectionFactory, MediaConnection},
    error::{ConnectionErrorKind, Error},
    media_engine,
    track::{LocalTrack, MediaKind, RemoteStream, RemoteTrack},
};

/// [`MediaConnection`] backed by a webrtc-rs [`RTCPeerConnection`].
#[derive(Derivative)]
#[derivative(Debug)]
pub struct RtcConnection {
    pub id: String,
    #[derivative(Debug = "ignore")]
    peer_connection: Arc<RTCPeerConnection>,
    #[derivative(Debug = "ignore")]
    senders: Mutex<HashMap<MediaKind, Arc<RTCRtpSender>>>,
}

impl RtcConnection {
    pub async fn new(config: &MeshConfig, events: ConnectionEvents) -> Result<Self, Error> {
        let peer_connection = Self::generate_peer_connection(config).await?;

        let connection = Self {
            id: events.connection_id.clone(),
            peer_connection: Arc::new(peer_connection),
            senders: Mutex::new(HashMap::new()),
        };
        connection.ice_state_hooks(events);

        tracing::debug!("RtcConnection {} is created", connection.id);

        Ok(connection)
    }

    async fn generate_peer_connection(config: &MeshConfig) -> Result<RTCPeerConnection, Error> {
        let mut me = MediaEngine::default();
        media_engine::register_default_codecs(&mut me)?;
        media_engine::register_extensions(&mut me)?;
        let api = APIBuilder::new()
            .with_media_engine(me)
            .with_setting_engine(config.setting_engine())
            .build();

        let peer_connection = api.new_peer_connection(config.configuration()).await?;
        Ok(peer_connection)
    }

    async fn local_description(&self) -> Result<RTCSessionDescription, Error> {
        match self.peer_connection.local_description().await {
            Some(sdp) => Ok(sdp),
            None => Err(Error::new_connection(
                "Failed to set local description".to_string(),
                ConnectionErrorKind::LocalDescriptionError,
            )),
        }
    }

    // ICE events
    fn ice_state_hooks(&self, events: ConnectionEvents) {
        let peer = self.peer_connection.clone();

        peer.on_ice_candidate(Box::new(enc!( (events) move |candidate: Option<RTCIceCandidate>| {
            Box::pin(enc!( (events) async move {
                if let Some(candidate) = candidate {
                    tracing::debug!("on ice candidate: {}", candidate);
                    match candidate.to_json() {
                        Ok(init) => events.emit(ConnectionEvent::LocalCandidate(init)),
                        Err(err) => tracing::error!("failed to serialize ICE candidate: {}", err),
                    }
                }
            }))
        })));

        let streams: Arc<Mutex<HashMap<String, RemoteStream>>> = Arc::new(Mutex::new(HashMap::new()));
        peer.on_track(Box::new(enc!( (events, streams)
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                Box::pin(enc!( (events, streams) async move {
                    let stream_id = track.stream_id();
                    tracing::info!("on track: id={}, stream={}, ssrc={}", track.id(), stream_id, track.ssrc());

                    let snapshot = {
                        let mut streams = streams.lock().await;
                        let stream = streams
                            .entry(stream_id.clone())
                            .or_insert_with(|| RemoteStream::new(stream_id));
                        stream.add_track(RemoteTrack::new(track));
                        stream.clone()
                    };
                    events.emit(ConnectionEvent::RemoteStream(snapshot));
                }))
            }
        )));

        peer.on_ice_gathering_state_change(Box::new(move |state| {
            Box::pin(async move {
                tracing::debug!("ICE gathering state changed: {}", state);
            })
        }));

        peer.on_peer_connection_state_change(Box::new(enc!( (events)
            move |state: RTCPeerConnectionState| {
                Box::pin(enc!( (events) async move {
                    tracing::debug!("{} connection state changed: {}", events.participant_id, state);
                    events.emit(ConnectionEvent::StateChanged(state.into()));
                }))
            }
        )));
    }

    // Senders have to be read for RTCP to be processed.
    fn rtcp_drain_loop(&self, sender: Arc<RTCRtpSender>) {
        let id = self.id.clone();
        tokio::spawn(async move {
            while let Ok((packets, _)) = sender.read_rtcp().await {
                tracing::trace!("{} received {} RTCP packets", id, packets.len());
            }
            tracing::trace!("{} RTCP drain loop finished", id);
        });
    }
}

#[async_trait]
impl MediaConnection for RtcConnection {
    async fn add_track(&self, track: Arc<LocalTrack>) -> Result<(), Error> {
        let sender = self.peer_connection.add_track(track.rtp_track()).await?;
        self.rtcp_drain_loop(Arc::clone(&sender));
        self.senders.lock().await.insert(track.kind, sender);
        Ok(())
    }

    async fn replace_track(&self, track: Arc<LocalTrack>) -> Result<(), Error> {
        let senders = self.senders.lock().await;
        let sender = senders.get(&track.kind).ok_or(Error::new_connection(
            format!("no {:?} sender", track.kind),
            ConnectionErrorKind::SenderNotFoundError,
        ))?;
        sender.replace_track(Some(track.rtp_track())).await?;
        Ok(())
    }

    async fn create_offer(&self) -> Result<RTCSessionDescription, Error> {
        let offer = self.peer_connection.create_offer(None).await?;
        self.peer_connection.set_local_description(offer).await?;
        self.local_description().await
    }

    async fn create_answer(&self) -> Result<RTCSessionDescription, Error> {
        let answer = self.peer_connection.create_answer(None).await?;
        self.peer_connection.set_local_description(answer).await?;
        self.local_description().await
    }

    async fn set_remote_description(&self, sdp: RTCSessionDescription) -> Result<(), Error> {
        self.peer_connection.set_remote_description(sdp).await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: RTCIceCandidateInit) -> Result<(), Error> {
        self.peer_connection.add_ice_candidate(candidate).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), Error> {
        self.peer_connection.close().await?;
        Ok(())
    }
}

impl Drop for RtcConnection {
    fn drop(&mut self) {
        tracing::debug!("RtcConnection {} is dropped", self.id);
    }
}

#[derive(Clone, Debug, Default)]
pub struct RtcConnectionFactory {
    config: MeshConfig,
}

impl RtcConnectionFactory {
    pub fn new(config: MeshConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConnectionFactory for RtcConnectionFactory {
    async fn create(&self, events: ConnectionEvents) -> Result<Arc<dyn MediaConnection>, Error> {
        let connection = RtcConnection::new(&self.config, events).await?;
        Ok(Arc::new(connection))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        placeholder::make_placeholder_tracks,
        protocol::ParticipantId,
        track::{MediaKind, TrackSource},
    };
    use tokio::sync::mpsc;

    fn local_config() -> MeshConfig {
        MeshConfig {
            configuration: Default::default(),
            ..Default::default()
        }
    }

    async fn connection(
        name: &str,
    ) -> (
        Arc<dyn MediaConnection>,
        mpsc::UnboundedReceiver<crate::connection::ConnectionNotice>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let events = ConnectionEvents::new(ParticipantId::from(name), format!("{}-1", name), tx);
        let connection = RtcConnectionFactory::new(local_config())
            .create(events)
            .await
            .expect("connection");
        (connection, rx)
    }

    #[tokio::test]
    async fn test_offer_carries_both_placeholder_tracks() {
        let (offerer, _events) = connection("a").await;
        let tracks = make_placeholder_tracks("local");
        offerer.add_track(tracks.video).await.expect("video");
        offerer.add_track(tracks.audio).await.expect("audio");

        let offer = offerer.create_offer().await.expect("offer");
        assert!(offer.sdp.contains("m=video"));
        assert!(offer.sdp.contains("m=audio"));
        offerer.close().await.expect("close");
    }

    #[tokio::test]
    async fn test_answer_and_replace_track() {
        let (offerer, _a_events) = connection("a").await;
        let (answerer, _b_events) = connection("b").await;
        for connection in [&offerer, &answerer] {
            let tracks = make_placeholder_tracks("local");
            connection.add_track(tracks.video).await.expect("video");
            connection.add_track(tracks.audio).await.expect("audio");
        }

        let offer = offerer.create_offer().await.expect("offer");
        answerer.set_remote_description(offer).await.expect("remote offer");
        let answer = answerer.create_answer().await.expect("answer");
        assert!(answer.sdp.contains("m=video"));
        offerer.set_remote_description(answer).await.expect("remote answer");

        let screen = LocalTrack::new(MediaKind::Video, TrackSource::Screen, "local", true);
        offerer.replace_track(screen).await.expect("replace video");

        offerer.close().await.expect("close a");
        answerer.close().await.expect("close b");
    }

    #[tokio::test]
    async fn test_replace_without_sender() {
        let (connection, _events) = connection("a").await;
        let screen = LocalTrack::new(MediaKind::Video, TrackSource::Screen, "local", true);
        let err = connection.replace_track(screen).await.expect_err("no sender");
        assert!(matches!(
            err,
            Error::ConnectionError(ref e) if e.kind == ConnectionErrorKind::SenderNotFoundError
        ));
    }
}
