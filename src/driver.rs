use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::{
    connection::{ConnectionEvent, ConnectionEvents, ConnectionFactory, MediaConnection},
    error::Error,
    peer::Action,
};

/// Runs the media connection of one peer and executes its actions strictly in order.
///
/// Dropping the driver stops it: queued actions are discarded and the connection is closed.
#[derive(Debug)]
pub(crate) struct PeerDriver {
    action_sender: mpsc::UnboundedSender<Action>,
    _stop_sender: oneshot::Sender<()>,
}

impl PeerDriver {
    pub(crate) fn spawn(factory: Arc<dyn ConnectionFactory>, events: ConnectionEvents) -> Self {
        let (action_sender, action_receiver) = mpsc::unbounded_channel();
        let (stop_sender, stop_receiver) = oneshot::channel();

        tokio::spawn(async move {
            Self::driver_loop(factory, events, action_receiver, stop_receiver).await;
        });

        Self {
            action_sender,
            _stop_sender: stop_sender,
        }
    }

    pub(crate) fn send(&self, action: Action) {
        if self.action_sender.send(action).is_err() {
            tracing::debug!("driver is gone, action dropped");
        }
    }

    async fn driver_loop(
        factory: Arc<dyn ConnectionFactory>,
        events: ConnectionEvents,
        mut action_receiver: mpsc::UnboundedReceiver<Action>,
        mut stop_receiver: oneshot::Receiver<()>,
    ) {
        let connection = tokio::select! {
            biased;
            _ = &mut stop_receiver => {
                tracing::debug!("driver {} stopped before its connection was created", events.connection_id);
                return;
            }
            created = factory.create(events.clone()) => match created {
                Ok(connection) => connection,
                Err(err) => {
                    events.emit(ConnectionEvent::Failed(err.to_string()));
                    return;
                }
            },
        };

        loop {
            tokio::select! {
                biased;
                _ = &mut stop_receiver => break,
                action = action_receiver.recv() => {
                    let Some(action) = action else {
                        break;
                    };
                    let result = tokio::select! {
                        biased;
                        _ = &mut stop_receiver => break,
                        result = Self::execute(&connection, &events, action) => result,
                    };
                    if let Err(err) = result {
                        events.emit(ConnectionEvent::Failed(err.to_string()));
                        break;
                    }
                }
            }
        }

        if let Err(err) = connection.close().await {
            tracing::error!("failed to close connection {}: {}", events.connection_id, err);
        }
        tracing::debug!("driver {} finished", events.connection_id);
    }

    async fn execute(
        connection: &Arc<dyn MediaConnection>,
        events: &ConnectionEvents,
        action: Action,
    ) -> Result<(), Error> {
        match action {
            Action::AttachTrack(track) => connection.add_track(track).await,
            Action::ReplaceTrack(track) => connection.replace_track(track).await,
            Action::CreateOffer => {
                let offer = connection.create_offer().await?;
                events.emit(ConnectionEvent::LocalDescription(offer));
                Ok(())
            }
            Action::CreateAnswer => {
                let answer = connection.create_answer().await?;
                events.emit(ConnectionEvent::LocalDescription(answer));
                Ok(())
            }
            Action::ApplyRemoteDescription(sdp) => connection.set_remote_description(sdp).await,
            Action::AddIceCandidate(candidate) => {
                // A bad candidate is not fatal, others may still work.
                if let Err(err) = connection.add_ice_candidate(candidate).await {
                    tracing::warn!(
                        "failed to add ICE candidate for {}: {}",
                        events.participant_id,
                        err
                    );
                }
                Ok(())
            }
            Action::SendSignal(_) | Action::Release => {
                tracing::warn!("driver received {:?}, ignoring", action);
                Ok(())
            }
        }
    }
}
