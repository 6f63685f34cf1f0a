use std::sync::OnceLock;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    error::{Error, SignalingErrorKind},
    protocol::{ClientMessage, ParticipantId, SignalPayload, SignalingEvent},
    relay::RelayHandle,
};

/// Everything the relay sends us after the welcome. The channel closing means the transport is gone.
pub type SignalingEvents = mpsc::UnboundedReceiver<SignalingEvent>;

/// Bidirectional event transport to the relay.
///
/// `connect` subscribes: peer-joined, peer-left, signal and chat notifications arrive on the returned
/// receiver in relay order. Sending never blocks; implementations queue outgoing messages.
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    async fn connect(&self, room: &str) -> Result<(ParticipantId, SignalingEvents), Error>;

    fn send_signal(&self, to: &ParticipantId, payload: SignalPayload) -> Result<(), Error>;

    fn send_chat(&self, body: &str, sender_name: &str) -> Result<(), Error>;
}

/// Wait for the relay's welcome, which carries our own id.
pub(crate) async fn expect_welcome(
    events: &mut SignalingEvents,
) -> Result<ParticipantId, Error> {
    match events.recv().await {
        Some(SignalingEvent::Welcome { participant_id }) => Ok(participant_id),
        Some(other) => Err(Error::new_signaling(
            format!("expected welcome, got {:?}", other),
            SignalingErrorKind::UnexpectedMessageError,
        )),
        None => Err(Error::new_signaling(
            "signaling closed before welcome".to_string(),
            SignalingErrorKind::ChannelClosedError,
        )),
    }
}

/// Signaling over an in-process [`crate::relay::Relay`].
#[derive(Debug)]
pub struct MemorySignaling {
    relay: RelayHandle,
    participant_id: OnceLock<ParticipantId>,
}

impl MemorySignaling {
    pub fn new(relay: RelayHandle) -> Self {
        Self {
            relay,
            participant_id: OnceLock::new(),
        }
    }

    fn participant_id(&self) -> Result<&ParticipantId, Error> {
        self.participant_id.get().ok_or(Error::new_signaling(
            "signaling is not connected".to_string(),
            SignalingErrorKind::NotConnectedError,
        ))
    }

    /// Drop our membership, as a closed socket would.
    pub fn disconnect(&self) {
        if let Some(id) = self.participant_id.get() {
            self.relay.leave(id.clone());
        }
    }
}

#[async_trait]
impl SignalingChannel for MemorySignaling {
    async fn connect(&self, room: &str) -> Result<(ParticipantId, SignalingEvents), Error> {
        let participant_id = ParticipantId::generate();
        self.participant_id
            .set(participant_id.clone())
            .map_err(|_| {
                Error::new_signaling(
                    "signaling is already connected".to_string(),
                    SignalingErrorKind::AlreadyConnectedError,
                )
            })?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        self.relay.join(room.to_string(), participant_id, tx);
        let welcomed = expect_welcome(&mut rx).await?;
        Ok((welcomed, rx))
    }

    fn send_signal(&self, to: &ParticipantId, payload: SignalPayload) -> Result<(), Error> {
        let from = self.participant_id()?.clone();
        self.relay.forward(
            from,
            ClientMessage::Signal {
                to: to.clone(),
                payload,
            },
        );
        Ok(())
    }

    fn send_chat(&self, body: &str, sender_name: &str) -> Result<(), Error> {
        let from = self.participant_id()?.clone();
        self.relay.forward(
            from,
            ClientMessage::Chat {
                body: body.to_string(),
                sender_name: sender_name.to_string(),
            },
        );
        Ok(())
    }
}

impl Drop for MemorySignaling {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::relay::Relay;

    #[tokio::test]
    async fn test_memory_signaling_round_trip() {
        let relay = Relay::spawn();
        let a = MemorySignaling::new(relay.clone());
        let b = MemorySignaling::new(relay.clone());

        let (a_id, mut a_events) = a.connect("r1").await.expect("a connects");
        let (b_id, mut b_events) = b.connect("r1").await.expect("b connects");
        assert_ne!(a_id, b_id);

        // a: own join, then b's join
        assert!(matches!(
            a_events.recv().await,
            Some(SignalingEvent::PeerJoined { participant_id, .. }) if participant_id == a_id
        ));
        assert!(matches!(
            a_events.recv().await,
            Some(SignalingEvent::PeerJoined { participant_id, participants })
                if participant_id == b_id && participants == vec![a_id.clone(), b_id.clone()]
        ));
        assert!(matches!(
            b_events.recv().await,
            Some(SignalingEvent::PeerJoined { participant_id, .. }) if participant_id == b_id
        ));

        b.send_chat("hello", "bob").expect("chat");
        assert!(matches!(
            a_events.recv().await,
            Some(SignalingEvent::Chat { body, sender_name, sender_id })
                if body == "hello" && sender_name == "bob" && sender_id == b_id
        ));

        drop(b);
        assert!(matches!(
            a_events.recv().await,
            Some(SignalingEvent::PeerLeft { participant_id }) if participant_id == b_id
        ));
    }

    #[tokio::test]
    async fn test_connect_twice_is_rejected() {
        let relay = Relay::spawn();
        let a = MemorySignaling::new(relay);
        let _connected = a.connect("r1").await.expect("a connects");

        let err = a.connect("r1").await.expect_err("second connect");
        assert!(matches!(
            err,
            Error::SignalingError(ref e) if e.kind == SignalingErrorKind::AlreadyConnectedError
        ));
    }

    #[tokio::test]
    async fn test_send_before_connect() {
        let relay = Relay::spawn();
        let a = MemorySignaling::new(relay);
        assert!(a.send_chat("hi", "alice").is_err());
    }
}
