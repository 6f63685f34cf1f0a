use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::{
    config::PlaceholderConfig,
    error::{Error, MediaErrorKind},
    placeholder::{make_placeholder_tracks, FramePump},
    track::{LocalTrack, MediaKind, TrackSource},
};

pub const LOCAL_STREAM_ID: &str = "local";

/// Capture devices. Implementations return tracks created with [`LocalTrack::new`] and feed them
/// through [`LocalTrack::write_sample`], which drops samples while the user has the track muted.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn capture(&self, kind: MediaKind) -> Result<Arc<LocalTrack>, Error>;

    async fn capture_display(&self) -> Result<Arc<LocalTrack>, Error> {
        Err(Error::new_media(
            "display capture is not supported".to_string(),
            MediaErrorKind::UnsupportedError,
        ))
    }

    fn display_capture_supported(&self) -> bool {
        false
    }
}

/// No camera, no microphone, no screen. Every call runs on placeholders.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDevices;

#[async_trait]
impl MediaDevices for NoDevices {
    async fn capture(&self, kind: MediaKind) -> Result<Arc<LocalTrack>, Error> {
        Err(Error::new_media(
            format!("no {:?} device", kind),
            MediaErrorKind::DeviceNotFoundError,
        ))
    }
}

#[derive(Clone, Debug, Default)]
pub struct LocalMediaState {
    pub video_enabled: bool,
    pub audio_enabled: bool,
    pub screen_sharing: bool,
    pub video_available: bool,
    pub audio_available: bool,
    pub screen_available: bool,
    pub tracks: Vec<Arc<LocalTrack>>,
}

impl LocalMediaState {
    pub fn track(&self, kind: MediaKind) -> Option<&Arc<LocalTrack>> {
        self.tracks.iter().find(|t| t.kind == kind)
    }
}

/// Owns the local tracks of a call. Tracks are stopped on [`MediaSourceManager::release`] or on drop.
pub struct MediaSourceManager {
    devices: Arc<dyn MediaDevices>,
    placeholder: PlaceholderConfig,
    state: LocalMediaState,
    state_sender: watch::Sender<LocalMediaState>,
}

impl MediaSourceManager {
    pub fn new(devices: Arc<dyn MediaDevices>, placeholder: PlaceholderConfig) -> Self {
        let (state_sender, _) = watch::channel(LocalMediaState::default());
        Self {
            devices,
            placeholder,
            state: LocalMediaState::default(),
            state_sender,
        }
    }

    pub async fn acquire(&mut self, video_requested: bool, audio_requested: bool) -> LocalMediaState {
        self.release();

        let video = if video_requested {
            self.capture(MediaKind::Video).await
        } else {
            None
        };
        let audio = if audio_requested {
            self.capture(MediaKind::Audio).await
        } else {
            None
        };

        self.state.video_available = video.is_some();
        self.state.audio_available = audio.is_some();
        self.state.screen_available = self.devices.display_capture_supported();
        self.state.screen_sharing = false;

        if video.is_none() && audio.is_none() {
            tracing::info!("no capture device available, using placeholder media");
        }
        let placeholders = make_placeholder_tracks(LOCAL_STREAM_ID);
        let video = video.unwrap_or_else(|| self.start_placeholder(placeholders.video));
        let audio = audio.unwrap_or_else(|| self.start_placeholder(placeholders.audio));

        self.state.video_enabled = video.is_enabled();
        self.state.audio_enabled = audio.is_enabled();
        self.state.tracks = vec![video, audio];
        self.publish();

        self.state.clone()
    }

    async fn capture(&self, kind: MediaKind) -> Option<Arc<LocalTrack>> {
        match self.devices.capture(kind).await {
            Ok(track) => Some(track),
            Err(err) => {
                tracing::warn!("{:?} capture is unavailable: {}", kind, err);
                None
            }
        }
    }

    fn start_placeholder(&self, track: Arc<LocalTrack>) -> Arc<LocalTrack> {
        FramePump::start(Arc::clone(&track), self.placeholder.clone());
        track
    }

    pub fn toggle_video(&mut self) -> bool {
        if let Some(enabled) = self.state.track(MediaKind::Video).map(|t| t.toggle()) {
            self.state.video_enabled = enabled;
            self.publish();
        }
        self.state.video_enabled
    }

    pub fn toggle_audio(&mut self) -> bool {
        if let Some(enabled) = self.state.track(MediaKind::Audio).map(|t| t.toggle()) {
            self.state.audio_enabled = enabled;
            self.publish();
        }
        self.state.audio_enabled
    }

    pub async fn start_screen_share(&mut self) -> Result<Arc<LocalTrack>, Error> {
        let captured = self.devices.capture_display().await;
        self.install_screen_share(captured)
    }

    pub async fn stop_screen_share(&mut self) -> Result<Arc<LocalTrack>, Error> {
        let captured = self.devices.capture(MediaKind::Video).await;
        self.restore_camera(captured)
    }

    /// Swap the video slot to a captured display track.
    pub fn install_screen_share(
        &mut self,
        captured: Result<Arc<LocalTrack>, Error>,
    ) -> Result<Arc<LocalTrack>, Error> {
        let track = captured?;
        tracing::info!("screen share started: {}", track.id);
        self.replace_video(Arc::clone(&track));
        self.state.screen_sharing = true;
        self.publish();
        Ok(track)
    }

    /// Swap the video slot back to the camera, or to a placeholder when the camera is gone.
    pub fn restore_camera(
        &mut self,
        captured: Result<Arc<LocalTrack>, Error>,
    ) -> Result<Arc<LocalTrack>, Error> {
        let track = match captured {
            Ok(track) => {
                self.state.video_available = true;
                track
            }
            Err(err) => {
                tracing::warn!("camera is unavailable after screen share: {}", err);
                self.state.video_available = false;
                let placeholder = make_placeholder_tracks(LOCAL_STREAM_ID).video;
                self.start_placeholder(placeholder)
            }
        };
        tracing::info!("screen share stopped, video source is {:?}", track.source);
        self.replace_video(Arc::clone(&track));
        self.state.screen_sharing = false;
        self.state.video_enabled = track.is_enabled();
        self.publish();
        Ok(track)
    }

    fn replace_video(&mut self, track: Arc<LocalTrack>) {
        match self
            .state
            .tracks
            .iter_mut()
            .find(|t| t.kind == MediaKind::Video)
        {
            Some(slot) => {
                slot.stop();
                *slot = track;
            }
            None => self.state.tracks.push(track),
        }
    }

    pub fn release(&mut self) {
        if self.state.tracks.is_empty() {
            return;
        }
        for track in self.state.tracks.drain(..) {
            track.stop();
        }
        self.state.screen_sharing = false;
        self.publish();
        tracing::debug!("local media released");
    }

    pub fn devices(&self) -> Arc<dyn MediaDevices> {
        Arc::clone(&self.devices)
    }

    pub fn tracks(&self) -> &[Arc<LocalTrack>] {
        &self.state.tracks
    }

    pub fn state(&self) -> &LocalMediaState {
        &self.state
    }

    pub fn subscribe(&self) -> watch::Receiver<LocalMediaState> {
        self.state_sender.subscribe()
    }

    fn publish(&self) {
        self.state_sender.send_replace(self.state.clone());
    }
}

impl Drop for MediaSourceManager {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for MediaSourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaSourceManager")
            .field("state", &self.state)
            .finish()
    }
}
