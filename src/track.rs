use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use derivative::Derivative;
use uuid::Uuid;
use webrtc::{
    api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8},
    media::Sample,
    rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType},
    track::{
        track_local::{track_local_static_sample::TrackLocalStaticSample, TrackLocal},
        track_remote::TrackRemote,
    },
};

use crate::error::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

impl From<RTPCodecType> for MediaKind {
    fn from(kind: RTPCodecType) -> Self {
        match kind {
            RTPCodecType::Audio => MediaKind::Audio,
            _ => MediaKind::Video,
        }
    }
}

impl MediaKind {
    pub(crate) fn codec_capability(&self) -> RTCRtpCodecCapability {
        match self {
            MediaKind::Audio => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48000,
                channels: 2,
                sdp_fmtp_line: "minptime=10;useinbandfec=1".to_owned(),
                rtcp_feedback: vec![],
            },
            MediaKind::Video => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: 90000,
                channels: 0,
                sdp_fmtp_line: "".to_owned(),
                rtcp_feedback: vec![],
            },
        }
    }
}

/// Where the samples of a [`LocalTrack`] come from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackSource {
    Camera,
    Microphone,
    Screen,
    Placeholder,
}

/// A local capture track shared by every peer connection of a call.
///
/// The `enabled` flag lives here, once, so flipping it mutes the track for all peers at the same time.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct LocalTrack {
    pub id: String,
    pub kind: MediaKind,
    pub source: TrackSource,
    enabled: AtomicBool,
    stopped: AtomicBool,
    #[derivative(Debug = "ignore")]
    track: Arc<TrackLocalStaticSample>,
}

impl LocalTrack {
    pub fn new(kind: MediaKind, source: TrackSource, stream_id: &str, enabled: bool) -> Arc<Self> {
        let id = Uuid::new_v4().to_string();
        let track = Arc::new(TrackLocalStaticSample::new(
            kind.codec_capability(),
            id.clone(),
            stream_id.to_owned(),
        ));
        Arc::new(Self {
            id,
            kind,
            source,
            enabled: AtomicBool::new(enabled),
            stopped: AtomicBool::new(false),
            track,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Flip the enabled flag and return the new value.
    pub fn toggle(&self) -> bool {
        !self.enabled.fetch_xor(true, Ordering::SeqCst)
    }

    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            tracing::debug!("LocalTrack {} ({:?}) is stopped", self.id, self.source);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Write one captured sample. Returns false when the sample was dropped because the track is
    /// disabled or stopped.
    pub async fn write_sample(&self, sample: &Sample) -> Result<bool, Error> {
        if !self.is_enabled() || self.is_stopped() {
            return Ok(false);
        }
        self.track.write_sample(sample).await?;
        Ok(true)
    }

    /// The raw sample writer, ignoring the enabled flag. Placeholders write through it while disabled.
    pub(crate) fn sample_track(&self) -> Arc<TrackLocalStaticSample> {
        Arc::clone(&self.track)
    }

    pub(crate) fn rtp_track(&self) -> Arc<dyn TrackLocal + Send + Sync> {
        self.track.clone()
    }
}

#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct RemoteTrack {
    pub id: String,
    pub kind: MediaKind,
    #[derivative(Debug = "ignore")]
    track: Option<Arc<TrackRemote>>,
}

impl RemoteTrack {
    pub fn new(track: Arc<TrackRemote>) -> Self {
        Self {
            id: track.id(),
            kind: track.kind().into(),
            track: Some(track),
        }
    }

    /// A track description without an RTP source behind it.
    pub fn detached(id: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            id: id.into(),
            kind,
            track: None,
        }
    }

    /// RTP reader for rendering. Reading packets is left to the consumer.
    pub fn track(&self) -> Option<Arc<TrackRemote>> {
        self.track.clone()
    }
}

/// Media a remote participant sends us, grouped by their stream id.
#[derive(Clone, Debug)]
pub struct RemoteStream {
    pub id: String,
    pub tracks: Vec<RemoteTrack>,
}

impl RemoteStream {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tracks: vec![],
        }
    }

    /// Add a track, replacing a previous one with the same id.
    pub fn add_track(&mut self, track: RemoteTrack) {
        self.tracks.retain(|t| t.id != track.id);
        self.tracks.push(track);
    }

    pub fn has_kind(&self, kind: MediaKind) -> bool {
        self.tracks.iter().any(|t| t.kind == kind)
    }
}
