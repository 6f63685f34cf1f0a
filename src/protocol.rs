use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use webrtc::{
    ice_transport::ice_candidate::RTCIceCandidateInit,
    peer_connection::sdp::session_description::RTCSessionDescription,
};

/// Id the relay assigns to one signaling connection. A rejoin is a new id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// Body of a `signal` message, forwarded verbatim by the relay.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalPayload {
    Sdp(RTCSessionDescription),
    Ice(RTCIceCandidateInit),
}

/// Messages a client sends to the relay.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Join { room: String },
    #[serde(rename_all = "camelCase")]
    Signal {
        to: ParticipantId,
        payload: SignalPayload,
    },
    #[serde(rename_all = "camelCase")]
    Chat { body: String, sender_name: String },
}

/// Messages the relay delivers to a client.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum SignalingEvent {
    #[serde(rename_all = "camelCase")]
    Welcome { participant_id: ParticipantId },
    #[serde(rename_all = "camelCase")]
    PeerJoined {
        participant_id: ParticipantId,
        participants: Vec<ParticipantId>,
    },
    #[serde(rename_all = "camelCase")]
    PeerLeft { participant_id: ParticipantId },
    #[serde(rename_all = "camelCase")]
    Signal {
        from: ParticipantId,
        payload: SignalPayload,
    },
    #[serde(rename_all = "camelCase")]
    Chat {
        body: String,
        sender_name: String,
        sender_id: ParticipantId,
    },
}

#[cfg(test)]
mod test {
    use super::*;
    use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;

    #[test]
    fn test_signal_payload_shape() {
        let mut offer = RTCSessionDescription::default();
        offer.sdp_type = RTCSdpType::Offer;
        offer.sdp = "v=0".to_owned();
        let message = ClientMessage::Signal {
            to: ParticipantId::from("b"),
            payload: SignalPayload::Sdp(offer),
        };

        let json: serde_json::Value =
            serde_json::to_value(&message).expect("failed to serialize");
        assert_eq!(json["action"], "signal");
        assert_eq!(json["to"], "b");
        assert_eq!(json["payload"]["sdp"]["type"], "offer");
        assert_eq!(json["payload"]["sdp"]["sdp"], "v=0");
    }

    #[test]
    fn test_parse_peer_joined() {
        let text = r#"{"action":"peerJoined","participantId":"a","participants":["a","b"]}"#;
        let event: SignalingEvent = serde_json::from_str(text).expect("failed to parse");
        match event {
            SignalingEvent::PeerJoined {
                participant_id,
                participants,
            } => {
                assert_eq!(participant_id, ParticipantId::from("a"));
                assert_eq!(
                    participants,
                    vec![ParticipantId::from("a"), ParticipantId::from("b")]
                );
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_parse_ice_signal() {
        let text = r#"{"action":"signal","from":"a","payload":{"ice":{"candidate":"candidate:1 1 udp 2130706431 10.0.0.1 5000 typ host","sdpMid":"0","sdpMLineIndex":0}}}"#;
        let event: SignalingEvent = serde_json::from_str(text).expect("failed to parse");
        let SignalingEvent::Signal {
            from,
            payload: SignalPayload::Ice(candidate),
        } = event
        else {
            panic!("expected ice signal");
        };
        assert_eq!(from.as_str(), "a");
        assert_eq!(candidate.sdp_mid.as_deref(), Some("0"));
        assert_eq!(candidate.sdp_mline_index, Some(0));
    }

    #[test]
    fn test_chat_uses_camel_case() {
        let message = ClientMessage::Chat {
            body: "hi".to_owned(),
            sender_name: "alice".to_owned(),
        };
        let json = serde_json::to_string(&message).expect("failed to serialize");
        assert_eq!(
            json,
            r#"{"action":"chat","body":"hi","senderName":"alice"}"#
        );
    }
}
