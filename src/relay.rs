use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::protocol::{ClientMessage, ParticipantId, SignalingEvent};

type MemberSender = mpsc::UnboundedSender<SignalingEvent>;

/// A dumb forwarder between the members of each room. It never looks inside signal payloads.
#[derive(Debug)]
pub struct Relay {
    rooms: HashMap<String, Vec<ParticipantId>>,
    members: HashMap<ParticipantId, Member>,
}

#[derive(Debug)]
struct Member {
    room: String,
    sender: MemberSender,
}

#[derive(Debug)]
pub enum RelayEvent {
    Joined(String, ParticipantId, MemberSender),
    Message(ParticipantId, ClientMessage),
    Left(ParticipantId),
    Closed,
}

/// Handle to a running relay event loop.
#[derive(Clone, Debug)]
pub struct RelayHandle {
    relay_event_sender: mpsc::UnboundedSender<RelayEvent>,
}

impl Relay {
    pub fn new() -> Self {
        Self {
            rooms: HashMap::new(),
            members: HashMap::new(),
        }
    }

    /// Start the relay event loop and return a handle to it.
    pub fn spawn() -> RelayHandle {
        let (tx, rx) = mpsc::unbounded_channel::<RelayEvent>();
        tokio::spawn(async move {
            Relay::new().relay_event_loop(rx).await;
        });
        RelayHandle {
            relay_event_sender: tx,
        }
    }

    async fn relay_event_loop(mut self, mut event_receiver: mpsc::UnboundedReceiver<RelayEvent>) {
        while let Some(event) = event_receiver.recv().await {
            match event {
                RelayEvent::Joined(room, participant_id, sender) => {
                    self.join(room, participant_id, sender)
                }
                RelayEvent::Message(from, message) => self.forward(&from, message),
                RelayEvent::Left(participant_id) => self.leave(&participant_id),
                RelayEvent::Closed => break,
            }
        }
        tracing::info!("Relay event loop finished");
    }

    pub fn join(&mut self, room: String, participant_id: ParticipantId, sender: MemberSender) {
        if self.members.contains_key(&participant_id) {
            tracing::warn!("{} is already in a room", participant_id);
            return;
        }
        tracing::info!("{} joins room {}", participant_id, room);

        let _ = sender.send(SignalingEvent::Welcome {
            participant_id: participant_id.clone(),
        });
        self.members.insert(
            participant_id.clone(),
            Member {
                room: room.clone(),
                sender,
            },
        );
        let participants = self.rooms.entry(room.clone()).or_default();
        participants.push(participant_id.clone());
        let participants = participants.clone();

        // The joiner gets its own copy: that one confirms its join.
        self.broadcast(
            &room,
            None,
            SignalingEvent::PeerJoined {
                participant_id,
                participants,
            },
        );
    }

    pub fn leave(&mut self, participant_id: &ParticipantId) {
        let Some(member) = self.members.remove(participant_id) else {
            return;
        };
        tracing::info!("{} leaves room {}", participant_id, member.room);

        if let Some(participants) = self.rooms.get_mut(&member.room) {
            participants.retain(|id| id != participant_id);
            if participants.is_empty() {
                self.rooms.remove(&member.room);
                return;
            }
        }
        self.broadcast(
            &member.room,
            Some(participant_id),
            SignalingEvent::PeerLeft {
                participant_id: participant_id.clone(),
            },
        );
    }

    pub fn forward(&mut self, from: &ParticipantId, message: ClientMessage) {
        let Some(room) = self.members.get(from).map(|m| m.room.clone()) else {
            tracing::warn!("message from {} who has not joined", from);
            return;
        };

        match message {
            ClientMessage::Join { room } => {
                tracing::warn!("{} is already joined, ignoring join to {}", from, room);
            }
            ClientMessage::Signal { to, payload } => match self.members.get(&to) {
                Some(member) if member.room == room => {
                    let _ = member.sender.send(SignalingEvent::Signal {
                        from: from.clone(),
                        payload,
                    });
                }
                _ => tracing::debug!("signal from {} to unknown participant {}", from, to),
            },
            ClientMessage::Chat { body, sender_name } => self.broadcast(
                &room,
                Some(from),
                SignalingEvent::Chat {
                    body,
                    sender_name,
                    sender_id: from.clone(),
                },
            ),
        }
    }

    fn broadcast(&self, room: &str, except: Option<&ParticipantId>, event: SignalingEvent) {
        let Some(participants) = self.rooms.get(room) else {
            return;
        };
        for id in participants {
            if Some(id) == except {
                continue;
            }
            if let Some(member) = self.members.get(id) {
                if let Err(err) = member.sender.send(event.clone()) {
                    tracing::debug!("failed to deliver to {}: {}", id, err);
                }
            }
        }
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayHandle {
    pub fn join(&self, room: String, participant_id: ParticipantId, sender: MemberSender) {
        let _ = self
            .relay_event_sender
            .send(RelayEvent::Joined(room, participant_id, sender));
    }

    pub fn forward(&self, from: ParticipantId, message: ClientMessage) {
        let _ = self
            .relay_event_sender
            .send(RelayEvent::Message(from, message));
    }

    pub fn leave(&self, participant_id: ParticipantId) {
        let _ = self.relay_event_sender.send(RelayEvent::Left(participant_id));
    }

    pub fn close(&self) {
        let _ = self.relay_event_sender.send(RelayEvent::Closed);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::protocol::SignalPayload;
    use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;

    fn member(
        relay: &mut Relay,
        room: &str,
        id: &str,
    ) -> mpsc::UnboundedReceiver<SignalingEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        relay.join(room.to_owned(), ParticipantId::from(id), tx);
        rx
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SignalingEvent>) -> Vec<SignalingEvent> {
        let mut events = vec![];
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_join_is_broadcast_to_everyone() {
        let mut relay = Relay::new();
        let mut a = member(&mut relay, "r1", "a");
        let mut b = member(&mut relay, "r1", "b");

        let a_events = drain(&mut a);
        assert!(matches!(a_events[0], SignalingEvent::Welcome { .. }));
        match &a_events[2] {
            SignalingEvent::PeerJoined {
                participant_id,
                participants,
            } => {
                assert_eq!(participant_id.as_str(), "b");
                assert_eq!(participants.len(), 2);
            }
            other => panic!("unexpected event {:?}", other),
        }

        let b_events = drain(&mut b);
        assert_eq!(b_events.len(), 2);
        match &b_events[1] {
            SignalingEvent::PeerJoined { participant_id, .. } => {
                assert_eq!(participant_id.as_str(), "b")
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_signal_is_addressed() {
        let mut relay = Relay::new();
        let mut a = member(&mut relay, "r1", "a");
        let mut b = member(&mut relay, "r1", "b");
        let mut c = member(&mut relay, "r1", "c");
        drain(&mut a);
        drain(&mut b);
        drain(&mut c);

        relay.forward(
            &ParticipantId::from("a"),
            ClientMessage::Signal {
                to: ParticipantId::from("c"),
                payload: SignalPayload::Ice(RTCIceCandidateInit::default()),
            },
        );

        assert!(drain(&mut b).is_empty());
        let events = drain(&mut c);
        assert_eq!(events.len(), 1);
        assert!(
            matches!(&events[0], SignalingEvent::Signal { from, .. } if from.as_str() == "a")
        );
    }

    #[test]
    fn test_rooms_are_isolated() {
        let mut relay = Relay::new();
        let mut a = member(&mut relay, "r1", "a");
        let mut b = member(&mut relay, "r2", "b");
        drain(&mut a);
        drain(&mut b);

        relay.forward(
            &ParticipantId::from("a"),
            ClientMessage::Signal {
                to: ParticipantId::from("b"),
                payload: SignalPayload::Ice(RTCIceCandidateInit::default()),
            },
        );
        relay.forward(
            &ParticipantId::from("a"),
            ClientMessage::Chat {
                body: "hi".to_owned(),
                sender_name: "alice".to_owned(),
            },
        );
        assert!(drain(&mut b).is_empty());
    }

    #[test]
    fn test_leave_and_chat_skip_sender() {
        let mut relay = Relay::new();
        let mut a = member(&mut relay, "r1", "a");
        let mut b = member(&mut relay, "r1", "b");
        drain(&mut a);
        drain(&mut b);

        relay.forward(
            &ParticipantId::from("a"),
            ClientMessage::Chat {
                body: "hi".to_owned(),
                sender_name: "alice".to_owned(),
            },
        );
        assert!(drain(&mut a).is_empty());
        assert!(matches!(
            drain(&mut b).as_slice(),
            [SignalingEvent::Chat { sender_id, .. }] if sender_id.as_str() == "a"
        ));

        relay.leave(&ParticipantId::from("a"));
        relay.leave(&ParticipantId::from("a"));
        assert!(matches!(
            drain(&mut b).as_slice(),
            [SignalingEvent::PeerLeft { participant_id }] if participant_id.as_str() == "a"
        ));
    }
}
