use crate::protocol::ParticipantId;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub sender_name: String,
    pub body: String,
    /// True for messages this client sent.
    pub local_echo: bool,
}

/// Append-only chat history of a call plus the unread counter of the chat panel.
#[derive(Clone, Debug, Default)]
pub struct ChatLog {
    messages: Vec<ChatMessage>,
    unread: usize,
    panel_open: bool,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message we just sent.
    pub fn push_local(&mut self, sender_name: &str, body: &str) {
        self.messages.push(ChatMessage {
            sender_name: sender_name.to_owned(),
            body: body.to_owned(),
            local_echo: true,
        });
    }

    /// Record a message from the relay. Returns false for the relay's echo of our own message.
    pub fn receive(
        &mut self,
        local_id: &ParticipantId,
        sender_id: &ParticipantId,
        sender_name: &str,
        body: &str,
    ) -> bool {
        if sender_id == local_id {
            tracing::debug!("dropping relay echo of our own chat message");
            return false;
        }
        self.messages.push(ChatMessage {
            sender_name: sender_name.to_owned(),
            body: body.to_owned(),
            local_echo: false,
        });
        if !self.panel_open {
            self.unread += 1;
        }
        true
    }

    pub fn open_panel(&mut self) {
        self.panel_open = true;
        self.unread = 0;
    }

    pub fn close_panel(&mut self) {
        self.panel_open = false;
    }

    pub fn is_panel_open(&self) -> bool {
        self.panel_open
    }

    pub fn unread(&self) -> usize {
        self.unread
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }
}
