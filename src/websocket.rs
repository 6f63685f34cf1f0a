use std::sync::OnceLock;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::{
    error::{Error, SignalingErrorKind},
    protocol::{ClientMessage, ParticipantId, SignalPayload, SignalingEvent},
    signaling::{expect_welcome, SignalingChannel, SignalingEvents},
};

/// Signaling over a WebSocket to a relay speaking the JSON protocol in [`crate::protocol`].
#[derive(Debug)]
pub struct WebSocketSignaling {
    url: String,
    outgoing: OnceLock<mpsc::UnboundedSender<ClientMessage>>,
}

impl WebSocketSignaling {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            outgoing: OnceLock::new(),
        }
    }

    fn send(&self, message: ClientMessage) -> Result<(), Error> {
        let outgoing = self.outgoing.get().ok_or(Error::new_signaling(
            "signaling is not connected".to_string(),
            SignalingErrorKind::NotConnectedError,
        ))?;
        outgoing.send(message).map_err(|_| {
            Error::new_signaling(
                "signaling writer is closed".to_string(),
                SignalingErrorKind::ChannelClosedError,
            )
        })
    }
}

#[async_trait]
impl SignalingChannel for WebSocketSignaling {
    async fn connect(&self, room: &str) -> Result<(ParticipantId, SignalingEvents), Error> {
        if self.outgoing.get().is_some() {
            return Err(Error::new_signaling(
                "signaling is already connected".to_string(),
                SignalingErrorKind::AlreadyConnectedError,
            ));
        }

        let (stream, _) = connect_async(self.url.as_str()).await?;
        tracing::info!("signaling connected to {}", self.url);
        let (mut write, mut read) = stream.split();

        let (outgoing_sender, mut outgoing_receiver) = mpsc::unbounded_channel::<ClientMessage>();
        let _ = outgoing_sender.send(ClientMessage::Join {
            room: room.to_string(),
        });
        self.outgoing.set(outgoing_sender).map_err(|_| {
            Error::new_signaling(
                "signaling is already connected".to_string(),
                SignalingErrorKind::AlreadyConnectedError,
            )
        })?;

        tokio::spawn(async move {
            while let Some(message) = outgoing_receiver.recv().await {
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(err) => {
                        tracing::error!("failed to serialize signaling message: {}", err);
                        continue;
                    }
                };
                if let Err(err) = write.send(Message::Text(text)).await {
                    tracing::error!("failed to write signaling message: {}", err);
                    break;
                }
            }
            let _ = write.close().await;
            tracing::debug!("signaling writer loop finished");
        });

        let (event_sender, mut events) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(message) = read.next().await {
                match message {
                    Ok(Message::Text(text)) => match serde_json::from_str::<SignalingEvent>(&text) {
                        Ok(event) => {
                            if event_sender.send(event).is_err() {
                                break;
                            }
                        }
                        Err(err) => {
                            tracing::error!("failed to parse relay message: {}\n{}", err, text)
                        }
                    },
                    Ok(Message::Close(reason)) => {
                        tracing::info!("relay closed the socket: {:?}", reason);
                        break;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::error!("signaling socket error: {}", err);
                        break;
                    }
                }
            }
            tracing::debug!("signaling reader loop finished");
        });

        let participant_id = expect_welcome(&mut events).await?;
        tracing::info!("joined room {} as {}", room, participant_id);
        Ok((participant_id, events))
    }

    fn send_signal(&self, to: &ParticipantId, payload: SignalPayload) -> Result<(), Error> {
        self.send(ClientMessage::Signal {
            to: to.clone(),
            payload,
        })
    }

    fn send_chat(&self, body: &str, sender_name: &str) -> Result<(), Error> {
        self.send(ClientMessage::Chat {
            body: body.to_string(),
            sender_name: sender_name.to_string(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_send_before_connect() {
        let signaling = WebSocketSignaling::new("ws://127.0.0.1:1/socket");
        let err = signaling
            .send_chat("hi", "alice")
            .expect_err("not connected");
        assert!(matches!(
            err,
            Error::SignalingError(ref e) if e.kind == SignalingErrorKind::NotConnectedError
        ));
    }
}
