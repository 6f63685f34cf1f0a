use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use tokio::time::sleep;
use webrtc::media::Sample;

use crate::{
    config::PlaceholderConfig,
    track::{LocalTrack, MediaKind, TrackSource},
};

/// An Opus frame that decodes to 20ms of silence.
const OPUS_SILENCE_FRAME: [u8; 3] = [0xf8, 0xff, 0xfe];

/// A 16x16 VP8 keyframe of black luma and neutral chroma, at quantizer index 127.
pub(crate) const VP8_BLACK_KEYFRAME: [u8; 38] = [
    0x90, 0x00, 0x00, 0x9d, 0x01, 0x2a, 0x10, 0x00, 0x10, 0x00, 0x00, 0x00, 0xfe, 0x00, 0xfe, 0x9e,
    0xfb, 0xcd, 0xc4, 0xdc, 0xcd, 0xd2, 0x97, 0xde, 0x61, 0x2f, 0x3b, 0x8f, 0x30, 0x97, 0x98, 0x59,
    0x91, 0x4b, 0xcc, 0x2c, 0x39, 0x00,
];

#[derive(Debug)]
pub struct PlaceholderTracks {
    pub video: Arc<LocalTrack>,
    pub audio: Arc<LocalTrack>,
}

/// Disabled black video and silent audio tracks, used when capture is unavailable.
///
/// Creating them has no side effect. Nothing is written until [`FramePump::start`] is called.
pub fn make_placeholder_tracks(stream_id: &str) -> PlaceholderTracks {
    PlaceholderTracks {
        video: LocalTrack::new(MediaKind::Video, TrackSource::Placeholder, stream_id, false),
        audio: LocalTrack::new(MediaKind::Audio, TrackSource::Placeholder, stream_id, false),
    }
}

/// Keeps a placeholder track flowing so the remote side receives media and sees the track.
#[derive(Debug)]
pub(crate) struct FramePump;

impl FramePump {
    pub(crate) fn start(track: Arc<LocalTrack>, config: PlaceholderConfig) {
        tokio::spawn(async move {
            Self::write_samples(track, config).await;
        });
    }

    async fn write_samples(track: Arc<LocalTrack>, config: PlaceholderConfig) {
        tracing::debug!("Starting placeholder samples for {} ({:?})", track.id, track.kind);

        let (data, duration) = match track.kind {
            MediaKind::Video => (
                Bytes::from_static(&VP8_BLACK_KEYFRAME),
                config.video_frame_interval,
            ),
            MediaKind::Audio => (
                Bytes::from_static(&OPUS_SILENCE_FRAME),
                config.audio_frame_interval,
            ),
        };
        let writer = track.sample_track();

        while !track.is_stopped() {
            let sample = Sample {
                data: data.clone(),
                duration,
                ..Default::default()
            };
            if let Err(err) = writer.write_sample(&sample).await {
                tracing::error!("Error sending placeholder sample: {}", err);
                break;
            }
            sleep(pace(duration)).await;
        }

        tracing::debug!("Finished placeholder samples for {}", track.id);
    }
}

fn pace(duration: Duration) -> Duration {
    if duration.is_zero() {
        Duration::from_millis(1)
    } else {
        duration
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_placeholder_tracks_are_disabled() {
        let tracks = make_placeholder_tracks("local");

        assert_eq!(tracks.video.kind, MediaKind::Video);
        assert_eq!(tracks.audio.kind, MediaKind::Audio);
        assert_eq!(tracks.video.source, TrackSource::Placeholder);
        assert!(!tracks.video.is_enabled());
        assert!(!tracks.audio.is_enabled());
        assert_ne!(tracks.video.id, tracks.audio.id);
    }

    #[test]
    fn test_black_frame_is_a_vp8_keyframe() {
        let frame = &VP8_BLACK_KEYFRAME;
        // Frame tag: keyframe bit clear, shown, first partition inside the frame.
        assert_eq!(frame[0] & 0x01, 0);
        assert_eq!(frame[0] & 0x10, 0x10);
        let tag = u32::from_le_bytes([frame[0], frame[1], frame[2], 0]);
        let first_partition = (tag >> 5) as usize;
        assert!(10 + first_partition <= frame.len());
        assert_eq!(frame[3..6], [0x9d, 0x01, 0x2a]);
        assert_eq!(u16::from_le_bytes([frame[6], frame[7]]) & 0x3fff, 16);
        assert_eq!(u16::from_le_bytes([frame[8], frame[9]]) & 0x3fff, 16);
    }

    #[test]
    fn test_placeholder_video_stays_small() {
        let config = PlaceholderConfig::default();
        let per_second =
            VP8_BLACK_KEYFRAME.len() as f64 / config.video_frame_interval.as_secs_f64();
        assert!(per_second < 1024.0, "{} bytes/s", per_second);
    }

    #[tokio::test]
    async fn test_pump_stops_with_track() {
        let tracks = make_placeholder_tracks("local");
        let config = PlaceholderConfig {
            audio_frame_interval: Duration::from_millis(1),
            ..Default::default()
        };
        tracks.audio.stop();
        // Returns immediately because the track is already stopped.
        tokio::time::timeout(
            Duration::from_secs(1),
            FramePump::write_samples(Arc::clone(&tracks.audio), config),
        )
        .await
        .expect("pump did not stop");
    }
}
