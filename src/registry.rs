use std::{collections::HashSet, sync::Arc};

use derivative::Derivative;
use tokio::sync::{mpsc, watch};

use crate::{
    connection::{ConnectionEvent, ConnectionEvents, ConnectionFactory, ConnectionNotice},
    driver::PeerDriver,
    peer::{Action, PeerConnection, PeerState},
    protocol::{ParticipantId, SignalPayload},
    signaling::SignalingChannel,
    track::{LocalTrack, RemoteStream},
};

/// One remote participant as the UI sees it.
#[derive(Clone, Debug)]
pub struct PeerView {
    pub participant_id: ParticipantId,
    pub state: PeerState,
    pub stream: Option<RemoteStream>,
}

/// Remote participants in join order. `revision` grows by one on every publish.
#[derive(Clone, Debug, Default)]
pub struct PeerList {
    pub revision: u64,
    pub peers: Vec<PeerView>,
}

impl PeerList {
    pub fn get(&self, participant_id: &ParticipantId) -> Option<&PeerView> {
        self.peers
            .iter()
            .find(|p| &p.participant_id == participant_id)
    }
}

#[derive(Debug)]
struct Entry {
    peer: PeerConnection,
    driver: Option<PeerDriver>,
}

impl Entry {
    fn dispatch(&mut self, signaling: &Arc<dyn SignalingChannel>, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::SendSignal(payload) => {
                    if let Err(err) = signaling.send_signal(self.peer.participant_id(), payload) {
                        tracing::error!(
                            "failed to signal {}: {}",
                            self.peer.participant_id(),
                            err
                        );
                    }
                }
                // Dropping the driver discards queued work and closes the connection.
                Action::Release => {
                    self.driver.take();
                }
                action => match &self.driver {
                    Some(driver) => driver.send(action),
                    None => tracing::debug!("{:?} after release, dropped", action),
                },
            }
        }
    }

    fn view(&self) -> PeerView {
        PeerView {
            participant_id: self.peer.participant_id().clone(),
            state: self.peer.state(),
            stream: self.peer.remote_stream().cloned(),
        }
    }
}

/// The mesh coordinator: one [`PeerConnection`] per remote participant of the room.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct PeerRegistry {
    local_id: ParticipantId,
    tracks: Vec<Arc<LocalTrack>>,
    #[derivative(Debug = "ignore")]
    signaling: Arc<dyn SignalingChannel>,
    #[derivative(Debug = "ignore")]
    factory: Arc<dyn ConnectionFactory>,
    notice_sender: mpsc::UnboundedSender<ConnectionNotice>,
    entries: Vec<Entry>,
    departed: HashSet<ParticipantId>,
    revision: u64,
    peers_sender: watch::Sender<PeerList>,
}

impl PeerRegistry {
    pub fn new(
        local_id: ParticipantId,
        tracks: Vec<Arc<LocalTrack>>,
        signaling: Arc<dyn SignalingChannel>,
        factory: Arc<dyn ConnectionFactory>,
        notice_sender: mpsc::UnboundedSender<ConnectionNotice>,
    ) -> Self {
        let (peers_sender, _) = watch::channel(PeerList::default());
        Self {
            local_id,
            tracks,
            signaling,
            factory,
            notice_sender,
            entries: vec![],
            departed: HashSet::new(),
            revision: 0,
            peers_sender,
        }
    }

    pub fn local_id(&self) -> &ParticipantId {
        &self.local_id
    }

    pub fn on_peer_joined(&mut self, participant_id: &ParticipantId, participants: &[ParticipantId]) {
        let mut changed = false;
        for id in participants.iter().chain(std::iter::once(participant_id)) {
            if self.ensure_entry(id).is_some_and(|(_, created)| created) {
                changed = true;
            }
        }

        // Only the newcomer offers, so every pair negotiates exactly once.
        if participant_id == &self.local_id {
            for entry in self.entries.iter_mut() {
                let before = entry.peer.state();
                let actions = entry.peer.start_negotiation();
                entry.dispatch(&self.signaling, actions);
                changed |= entry.peer.state() != before;
            }
        }

        if changed {
            self.publish();
        }
    }

    pub fn on_peer_left(&mut self, participant_id: &ParticipantId) {
        if participant_id == &self.local_id {
            return;
        }
        self.departed.insert(participant_id.clone());

        let Some(index) = self.position(participant_id) else {
            tracing::debug!("{} left but has no entry", participant_id);
            return;
        };
        let mut entry = self.entries.remove(index);
        let actions = entry.peer.close();
        entry.dispatch(&self.signaling, actions);
        tracing::info!("{} left", participant_id);
        self.publish();
    }

    pub fn on_signal(&mut self, from: &ParticipantId, payload: SignalPayload) {
        let Some((index, created)) = self.ensure_entry(from) else {
            tracing::debug!("dropping signal from {}", from);
            return;
        };
        let entry = &mut self.entries[index];
        let before = entry.peer.state();
        let actions = entry.peer.handle_signal(payload);
        entry.dispatch(&self.signaling, actions);
        if created || entry.peer.state() != before {
            self.publish();
        }
    }

    pub fn on_connection_event(&mut self, notice: ConnectionNotice) {
        let Some(index) = self.position(&notice.participant_id) else {
            return;
        };
        let entry = &mut self.entries[index];
        if entry.peer.connection_id() != notice.connection_id {
            tracing::debug!(
                "dropping event from stale connection {}",
                notice.connection_id
            );
            return;
        }

        let before = entry.peer.state();
        let mut changed = false;
        let actions = match notice.event {
            ConnectionEvent::LocalDescription(sdp) => entry.peer.handle_local_description(sdp),
            ConnectionEvent::LocalCandidate(candidate) => {
                entry.peer.handle_local_candidate(candidate)
            }
            ConnectionEvent::RemoteStream(stream) => {
                changed = entry.peer.handle_remote_stream(stream);
                vec![]
            }
            ConnectionEvent::StateChanged(state) => entry.peer.handle_transport_state(state),
            ConnectionEvent::Failed(reason) => entry.peer.fail(&reason),
        };
        entry.dispatch(&self.signaling, actions);
        changed |= entry.peer.state() != before;

        if entry.peer.state() == PeerState::Failed {
            let entry = self.entries.remove(index);
            self.departed.insert(entry.peer.participant_id().clone());
            changed = true;
        }
        if changed {
            self.publish();
        }
    }

    /// Send `track` on every live connection in place of the current track of its kind.
    pub fn replace_track(&mut self, track: Arc<LocalTrack>) {
        match self.tracks.iter_mut().find(|t| t.kind == track.kind) {
            Some(slot) => *slot = Arc::clone(&track),
            None => self.tracks.push(Arc::clone(&track)),
        }
        for entry in self.entries.iter_mut() {
            let actions = entry.peer.replace_track(Arc::clone(&track));
            entry.dispatch(&self.signaling, actions);
        }
    }

    pub fn close_all(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        for mut entry in self.entries.drain(..) {
            let actions = entry.peer.close();
            entry.dispatch(&self.signaling, actions);
            self.departed.insert(entry.peer.participant_id().clone());
        }
        self.publish();
    }

    pub fn peers(&self) -> PeerList {
        self.peers_sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PeerList> {
        self.peers_sender.subscribe()
    }

    fn position(&self, participant_id: &ParticipantId) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.peer.participant_id() == participant_id)
    }

    /// Index of the entry for `participant_id`, created if needed. `None` for ourselves and departed ids.
    fn ensure_entry(&mut self, participant_id: &ParticipantId) -> Option<(usize, bool)> {
        if participant_id == &self.local_id || self.departed.contains(participant_id) {
            return None;
        }
        if let Some(index) = self.position(participant_id) {
            return Some((index, false));
        }

        let (peer, actions) = PeerConnection::new(participant_id.clone(), &self.tracks);
        let events = ConnectionEvents::new(
            participant_id.clone(),
            peer.connection_id().to_owned(),
            self.notice_sender.clone(),
        );
        let driver = PeerDriver::spawn(Arc::clone(&self.factory), events);
        let mut entry = Entry {
            peer,
            driver: Some(driver),
        };
        entry.dispatch(&self.signaling, actions);
        self.entries.push(entry);
        tracing::debug!("entry for {} is created", participant_id);
        Some((self.entries.len() - 1, true))
    }

    fn publish(&mut self) {
        self.revision += 1;
        let list = PeerList {
            revision: self.revision,
            peers: self.entries.iter().map(Entry::view).collect(),
        };
        self.peers_sender.send_replace(list);
    }
}

impl Drop for PeerRegistry {
    fn drop(&mut self) {
        self.close_all();
    }
}
