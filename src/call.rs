use std::sync::Arc;

use derivative::Derivative;
use tokio::sync::{mpsc, watch};

use crate::{
    chat::ChatLog,
    config::PlaceholderConfig,
    connection::{ConnectionFactory, ConnectionNotice},
    error::Error,
    media::{LocalMediaState, MediaDevices, MediaSourceManager},
    protocol::{ParticipantId, SignalingEvent},
    registry::{PeerList, PeerRegistry},
    signaling::{SignalingChannel, SignalingEvents},
    track::{LocalTrack, MediaKind},
};

#[derive(Clone, Debug)]
pub struct JoinOptions {
    pub room: String,
    pub username: String,
    pub video: bool,
    pub audio: bool,
    pub placeholder: PlaceholderConfig,
}

impl JoinOptions {
    pub fn new(room: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            room: room.into(),
            username: username.into(),
            video: true,
            audio: true,
            placeholder: PlaceholderConfig::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndReason {
    Hangup,
    TransportLost,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallState {
    InCall,
    Ended(EndReason),
}

/// User intents.
#[derive(Clone, Debug)]
pub enum Command {
    ToggleVideo,
    ToggleAudio,
    StartScreenShare,
    StopScreenShare,
    SendChat(String),
    OpenChat,
    CloseChat,
    Hangup,
}

#[derive(Debug)]
enum Capture {
    Screen(Result<Arc<LocalTrack>, Error>),
    Camera(Result<Arc<LocalTrack>, Error>),
}

/// A screen share capture that has not come back yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PendingShare {
    Starting { stop_requested: bool },
    Stopping,
}

/// What a UI holds on to while the call runs.
#[derive(Clone, Debug)]
pub struct CallHandle {
    pub participant_id: ParticipantId,
    command_sender: mpsc::UnboundedSender<Command>,
    pub peers: watch::Receiver<PeerList>,
    pub media: watch::Receiver<LocalMediaState>,
    pub chat: watch::Receiver<ChatLog>,
    pub state: watch::Receiver<CallState>,
}

impl CallHandle {
    pub fn command(&self, command: Command) {
        if self.command_sender.send(command).is_err() {
            tracing::debug!("call has ended, command dropped");
        }
    }

    pub fn toggle_video(&self) {
        self.command(Command::ToggleVideo);
    }

    pub fn toggle_audio(&self) {
        self.command(Command::ToggleAudio);
    }

    pub fn start_screen_share(&self) {
        self.command(Command::StartScreenShare);
    }

    pub fn stop_screen_share(&self) {
        self.command(Command::StopScreenShare);
    }

    pub fn send_chat(&self, body: impl Into<String>) {
        self.command(Command::SendChat(body.into()));
    }

    pub fn open_chat(&self) {
        self.command(Command::OpenChat);
    }

    pub fn close_chat(&self) {
        self.command(Command::CloseChat);
    }

    pub fn hangup(&self) {
        self.command(Command::Hangup);
    }
}

/// One client in one room. [`Call::run`] is the only place room state changes.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Call {
    local_id: ParticipantId,
    room: String,
    username: String,
    #[derivative(Debug = "ignore")]
    signaling: Arc<dyn SignalingChannel>,
    signaling_events: SignalingEvents,
    media: MediaSourceManager,
    registry: PeerRegistry,
    chat: ChatLog,
    chat_sender: watch::Sender<ChatLog>,
    state_sender: watch::Sender<CallState>,
    command_receiver: mpsc::UnboundedReceiver<Command>,
    notice_receiver: mpsc::UnboundedReceiver<ConnectionNotice>,
    capture_sender: mpsc::UnboundedSender<Capture>,
    capture_receiver: mpsc::UnboundedReceiver<Capture>,
    pending_share: Option<PendingShare>,
}

impl Call {
    /// Acquire local media, then connect to the room.
    pub async fn join(
        options: JoinOptions,
        signaling: Arc<dyn SignalingChannel>,
        devices: Arc<dyn MediaDevices>,
        factory: Arc<dyn ConnectionFactory>,
    ) -> Result<(Call, CallHandle), Error> {
        let mut media = MediaSourceManager::new(devices, options.placeholder.clone());
        let local_media = media.acquire(options.video, options.audio).await;

        let (local_id, signaling_events) = signaling.connect(&options.room).await?;

        let (notice_sender, notice_receiver) = mpsc::unbounded_channel();
        let registry = PeerRegistry::new(
            local_id.clone(),
            local_media.tracks.clone(),
            Arc::clone(&signaling),
            factory,
            notice_sender,
        );

        let (command_sender, command_receiver) = mpsc::unbounded_channel();
        let (capture_sender, capture_receiver) = mpsc::unbounded_channel();
        let (chat_sender, chat) = watch::channel(ChatLog::new());
        let (state_sender, state) = watch::channel(CallState::InCall);

        let handle = CallHandle {
            participant_id: local_id.clone(),
            command_sender,
            peers: registry.subscribe(),
            media: media.subscribe(),
            chat,
            state,
        };

        tracing::info!(
            "{} joined room {} as {}",
            options.username,
            options.room,
            local_id
        );

        let call = Call {
            local_id,
            room: options.room,
            username: options.username,
            signaling,
            signaling_events,
            media,
            registry,
            chat: ChatLog::new(),
            chat_sender,
            state_sender,
            command_receiver,
            notice_receiver,
            capture_sender,
            capture_receiver,
            pending_share: None,
        };
        Ok((call, handle))
    }

    pub async fn run(mut self) -> EndReason {
        let reason = loop {
            tokio::select! {
                event = self.signaling_events.recv() => match event {
                    Some(event) => self.handle_signaling_event(event),
                    None => {
                        tracing::error!("signaling transport lost in room {}", self.room);
                        break EndReason::TransportLost;
                    }
                },
                Some(notice) = self.notice_receiver.recv() => self.registry.on_connection_event(notice),
                Some(capture) = self.capture_receiver.recv() => self.handle_capture(capture),
                command = self.command_receiver.recv() => match command {
                    Some(Command::Hangup) | None => break EndReason::Hangup,
                    Some(command) => self.handle_command(command),
                },
            }
        };

        self.registry.close_all();
        self.media.release();
        self.state_sender.send_replace(CallState::Ended(reason));
        tracing::info!("left room {}: {:?}", self.room, reason);
        reason
    }

    fn handle_signaling_event(&mut self, event: SignalingEvent) {
        match event {
            SignalingEvent::PeerJoined {
                participant_id,
                participants,
            } => self.registry.on_peer_joined(&participant_id, &participants),
            SignalingEvent::PeerLeft { participant_id } => {
                self.registry.on_peer_left(&participant_id)
            }
            SignalingEvent::Signal { from, payload } => self.registry.on_signal(&from, payload),
            SignalingEvent::Chat {
                body,
                sender_name,
                sender_id,
            } => {
                if self
                    .chat
                    .receive(&self.local_id, &sender_id, &sender_name, &body)
                {
                    self.publish_chat();
                }
            }
            SignalingEvent::Welcome { participant_id } => {
                tracing::warn!("unexpected welcome for {}", participant_id)
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::ToggleVideo => {
                self.media.toggle_video();
            }
            Command::ToggleAudio => {
                self.media.toggle_audio();
            }
            Command::StartScreenShare => {
                match self.pending_share {
                    Some(PendingShare::Starting { .. }) => {
                        self.pending_share = Some(PendingShare::Starting {
                            stop_requested: false,
                        });
                        return;
                    }
                    Some(PendingShare::Stopping) => {
                        tracing::debug!("screen share is stopping, start ignored");
                        return;
                    }
                    None if self.media.state().screen_sharing => return,
                    None => {}
                }
                self.pending_share = Some(PendingShare::Starting {
                    stop_requested: false,
                });
                let devices = self.media.devices();
                let capture_sender = self.capture_sender.clone();
                tokio::spawn(async move {
                    let captured = devices.capture_display().await;
                    let _ = capture_sender.send(Capture::Screen(captured));
                });
            }
            Command::StopScreenShare => {
                match self.pending_share {
                    // Applied once the display capture comes back.
                    Some(PendingShare::Starting { .. }) => {
                        self.pending_share = Some(PendingShare::Starting {
                            stop_requested: true,
                        });
                        return;
                    }
                    Some(PendingShare::Stopping) => return,
                    None if !self.media.state().screen_sharing => return,
                    None => {}
                }
                self.pending_share = Some(PendingShare::Stopping);
                let devices = self.media.devices();
                let capture_sender = self.capture_sender.clone();
                tokio::spawn(async move {
                    let captured = devices.capture(MediaKind::Video).await;
                    let _ = capture_sender.send(Capture::Camera(captured));
                });
            }
            Command::SendChat(body) => {
                if let Err(err) = self.signaling.send_chat(&body, &self.username) {
                    tracing::error!("failed to send chat message: {}", err);
                    return;
                }
                self.chat.push_local(&self.username, &body);
                self.publish_chat();
            }
            Command::OpenChat => {
                self.chat.open_panel();
                self.publish_chat();
            }
            Command::CloseChat => {
                self.chat.close_panel();
                self.publish_chat();
            }
            Command::Hangup => {}
        }
    }

    fn handle_capture(&mut self, capture: Capture) {
        let pending = self.pending_share.take();
        let result = match capture {
            Capture::Screen(Ok(track))
                if pending == Some(PendingShare::Starting { stop_requested: true }) =>
            {
                tracing::info!("screen share {} was stopped before it started", track.id);
                track.stop();
                return;
            }
            Capture::Screen(captured) => self.media.install_screen_share(captured),
            Capture::Camera(captured) => self.media.restore_camera(captured),
        };
        match result {
            Ok(track) => self.registry.replace_track(track),
            Err(err) => tracing::warn!("screen share is unavailable: {}", err),
        }
    }

    fn publish_chat(&self) {
        self.chat_sender.send_replace(self.chat.clone());
    }
}
