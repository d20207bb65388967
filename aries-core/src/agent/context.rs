use crate::connection::ConnectionRecord;

use super::registry::AgentMessage;
use super::types::AgentError;

/// `InboundMessageContext` is what a handler receives for one decoded inbound message
#[derive(Debug, Clone)]
pub struct InboundMessageContext {
    pub message: AgentMessage,
    pub connection: Option<ConnectionRecord>,
    pub sender_verkey: Option<String>,
    pub recipient_verkey: Option<String>,
}

impl InboundMessageContext {
    pub fn new(message: AgentMessage) -> Self {
        Self {
            message,
            connection: None,
            sender_verkey: None,
            recipient_verkey: None,
        }
    }

    pub fn with_connection(mut self, connection: Option<ConnectionRecord>) -> Self {
        self.connection = connection;
        self
    }

    pub fn with_keys(mut self, sender_verkey: Option<String>, recipient_verkey: Option<String>) -> Self {
        self.sender_verkey = sender_verkey;
        self.recipient_verkey = recipient_verkey;
        self
    }

    pub fn connection_id(&self) -> Option<String> {
        self.connection.as_ref().map(|conn| conn.get_id())
    }

    /// `assert_ready_connection` fails unless the message arrived over a connection that
    /// finished its handshake
    pub fn assert_ready_connection(&self) -> Result<&ConnectionRecord, AgentError> {
        match &self.connection {
            Some(connection) if connection.is_ready() => Ok(connection),
            Some(connection) => Err(AgentError::ConnectionNotReady(format!(
                "connection {} is in state {}",
                connection.get_id(),
                connection.get_state()
            ))),
            None => Err(AgentError::ConnectionNotReady(format!(
                "no connection associated with {}",
                self.message.message_type()
            ))),
        }
    }
}

/// `OutboundMessage` is a message ready to be packed and delivered over a connection
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub payload: AgentMessage,
    pub connection: ConnectionRecord,
}

impl OutboundMessage {
    pub fn new(payload: impl Into<AgentMessage>, connection: ConnectionRecord) -> Self {
        Self {
            payload: payload.into(),
            connection,
        }
    }
}
