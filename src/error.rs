use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    WebRTCError(#[from] webrtc::Error),
    #[error(transparent)]
    JsonError(#[from] serde_json::Error),
    #[error(transparent)]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),
    #[error(transparent)]
    ConnectionError(#[from] ConnectionError),
    #[error(transparent)]
    SignalingError(#[from] SignalingError),
    #[error(transparent)]
    MediaError(#[from] MediaError),
}

#[derive(thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
}

#[derive(thiserror::Error)]
#[error("{kind}: {message}")]
pub struct SignalingError {
    pub kind: SignalingErrorKind,
    pub message: String,
}

#[derive(thiserror::Error)]
#[error("{kind}: {message}")]
pub struct MediaError {
    pub kind: MediaErrorKind,
    pub message: String,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionErrorKind {
    #[error("peer connection error")]
    PeerConnectionError,
    #[error("local description error")]
    LocalDescriptionError,
    #[error("sender not found error")]
    SenderNotFoundError,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SignalingErrorKind {
    #[error("already connected error")]
    AlreadyConnectedError,
    #[error("not connected error")]
    NotConnectedError,
    #[error("channel closed error")]
    ChannelClosedError,
    #[error("unexpected message error")]
    UnexpectedMessageError,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum MediaErrorKind {
    #[error("permission denied error")]
    PermissionDeniedError,
    #[error("device not found error")]
    DeviceNotFoundError,
    #[error("unsupported error")]
    UnsupportedError,
}

impl Error {
    pub fn new_connection(message: String, kind: ConnectionErrorKind) -> Error {
        Error::ConnectionError(ConnectionError { kind, message })
    }

    pub fn new_signaling(message: String, kind: SignalingErrorKind) -> Error {
        Error::SignalingError(SignalingError { kind, message })
    }

    pub fn new_media(message: String, kind: MediaErrorKind) -> Error {
        Error::MediaError(MediaError { kind, message })
    }
}

impl fmt::Debug for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builder = f.debug_struct("meshcall::ConnectionError");

        builder.field("kind", &self.kind);
        builder.field("message", &self.message);

        builder.finish()
    }
}

impl fmt::Debug for SignalingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builder = f.debug_struct("meshcall::SignalingError");

        builder.field("kind", &self.kind);
        builder.field("message", &self.message);

        builder.finish()
    }
}

impl fmt::Debug for MediaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builder = f.debug_struct("meshcall::MediaError");

        builder.field("kind", &self.kind);
        builder.field("message", &self.message);

        builder.finish()
    }
}
