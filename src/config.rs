use std::{net::IpAddr, sync::Arc, time::Duration};

use derivative::Derivative;
use webrtc::{
    api::setting_engine::SettingEngine, ice_transport::ice_server::RTCIceServer,
    peer_connection::configuration::RTCConfiguration,
};
use webrtc_ice::network_type::NetworkType;

pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// Configuration for every [`crate::rtc::RtcConnection`] of a call and for the placeholder media.
#[derive(Derivative)]
#[derivative(Clone, Debug)]
pub struct MeshConfig {
    #[derivative(Debug = "ignore")]
    pub configuration: RTCConfiguration,
    pub announced_ips: Vec<IpAddr>,
    /// How long ICE may stay disconnected before the connection is considered failed.
    pub ice_disconnected_timeout: Option<Duration>,
    pub ice_failed_timeout: Option<Duration>,
    pub ice_keep_alive_interval: Option<Duration>,
    pub network_types: Vec<NetworkType>,
    pub placeholder: PlaceholderConfig,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            configuration: RTCConfiguration {
                ice_servers: vec![RTCIceServer {
                    urls: vec![DEFAULT_STUN_SERVER.to_owned()],
                    ..Default::default()
                }],
                ..Default::default()
            },
            announced_ips: vec![],
            ice_disconnected_timeout: None,
            ice_failed_timeout: None,
            ice_keep_alive_interval: None,
            network_types: vec![],
            placeholder: Default::default(),
        }
    }
}

impl MeshConfig {
    pub fn configuration(&self) -> RTCConfiguration {
        self.configuration.clone()
    }

    /// Replace the ICE servers, e.g. from command line flags.
    pub fn with_ice_servers(mut self, urls: Vec<String>) -> Self {
        self.configuration.ice_servers = urls
            .into_iter()
            .map(|url| RTCIceServer {
                urls: vec![url],
                ..Default::default()
            })
            .collect();
        self
    }

    pub(crate) fn setting_engine(&self) -> SettingEngine {
        let mut setting_engine = SettingEngine::default();

        if self.ice_disconnected_timeout.is_some()
            || self.ice_failed_timeout.is_some()
            || self.ice_keep_alive_interval.is_some()
        {
            setting_engine.set_ice_timeouts(
                self.ice_disconnected_timeout,
                self.ice_failed_timeout,
                self.ice_keep_alive_interval,
            );
        }

        if !self.announced_ips.is_empty() {
            let announced_ips = Arc::new(self.announced_ips.clone());
            setting_engine.set_ip_filter(Box::new({
                let announced_ips = Arc::clone(&announced_ips);
                move |ip| announced_ips.contains(&ip)
            }));
        }

        if !self.network_types.is_empty() {
            setting_engine.set_network_types(self.network_types.clone());
        }

        setting_engine
    }
}

/// Cadence of the synthetic black video and silent audio tracks.
#[derive(Clone, Debug)]
pub struct PlaceholderConfig {
    /// One black keyframe per interval keeps the remote track alive.
    pub video_frame_interval: Duration,
    pub audio_frame_interval: Duration,
}

impl Default for PlaceholderConfig {
    fn default() -> Self {
        Self {
            video_frame_interval: Duration::from_secs(1),
            audio_frame_interval: Duration::from_millis(20),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_uses_public_stun() {
        let config = MeshConfig::default();
        assert_eq!(config.configuration.ice_servers.len(), 1);
        assert_eq!(
            config.configuration.ice_servers[0].urls,
            vec![DEFAULT_STUN_SERVER.to_owned()]
        );
    }

    #[test]
    fn test_with_ice_servers() {
        let config = MeshConfig::default().with_ice_servers(vec![
            "stun:a.example.com:3478".to_owned(),
            "turn:b.example.com:3478".to_owned(),
        ]);
        let urls: Vec<String> = config
            .configuration()
            .ice_servers
            .into_iter()
            .flat_map(|s| s.urls)
            .collect();
        assert_eq!(
            urls,
            vec!["stun:a.example.com:3478", "turn:b.example.com:3478"]
        );
    }
}
