use std::collections::HashMap;
use std::sync::Arc;

use rst_common::standard::async_trait::async_trait;
use rst_common::with_logging::log::{debug, info};

use super::context::{InboundMessageContext, OutboundMessage};
use super::types::{AgentError, TransportBuilder};

/// `MessageHandler` processes one message type
///
/// Returning `Some` means the handler produced a reply that must be delivered over the
/// connection of the inbound message.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    fn message_type(&self) -> &'static str;

    async fn handle(
        &self,
        ctx: InboundMessageContext,
    ) -> Result<Option<OutboundMessage>, AgentError>;
}

/// `Dispatcher` routes a decoded inbound message to the single handler registered for its type
/// and delivers the reply, if any, through the transport
#[derive(Clone)]
pub struct Dispatcher {
    handlers: HashMap<&'static str, Arc<dyn MessageHandler>>,
    transport: Arc<dyn TransportBuilder>,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn TransportBuilder>) -> Self {
        Self {
            handlers: HashMap::new(),
            transport,
        }
    }

    pub fn register_handler(&mut self, handler: Arc<dyn MessageHandler>) -> Result<(), AgentError> {
        let message_type = handler.message_type();
        if self.handlers.contains_key(message_type) {
            return Err(AgentError::DuplicateHandler(message_type.to_string()));
        }

        debug!("dispatcher: handler registered for {}", message_type);
        self.handlers.insert(message_type, handler);
        Ok(())
    }

    pub fn has_handler(&self, message_type: &str) -> bool {
        self.handlers.contains_key(message_type)
    }

    pub async fn dispatch(
        &self,
        ctx: InboundMessageContext,
    ) -> Result<Option<OutboundMessage>, AgentError> {
        let message_type = ctx.message.message_type();
        let handler = self
            .handlers
            .get(message_type)
            .ok_or_else(|| AgentError::UnhandledMessageType(message_type.to_string()))?;

        info!(
            "dispatcher: handling {} on thread {}",
            message_type,
            ctx.message.get_thread_id()
        );

        let outbound = handler.handle(ctx).await?;
        if let Some(reply) = &outbound {
            debug!(
                "dispatcher: sending {} to connection {}",
                reply.payload.message_type(),
                reply.connection.get_id()
            );

            self.transport.send(reply.clone()).await?;
        }

        Ok(outbound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use mockall::mock;

    use rst_common::standard::serde_json::Value;
    use rst_common::with_tokio::tokio;

    use crate::agent::registry::AgentMessage;
    use crate::basicmessage::BasicMessage;
    use crate::connection::{ConnectionRecord, ConnectionRole, ConnectionState};
    use crate::agent::message::DidCommMessage;

    mock!(
        FakeTransport{}

        #[async_trait]
        impl TransportBuilder for FakeTransport {
            async fn send(&self, message: OutboundMessage) -> Result<(), AgentError>;
            async fn receive_packed(&self, packed: Value) -> Result<(), AgentError>;
        }
    );

    struct EchoHandler;

    #[async_trait]
    impl MessageHandler for EchoHandler {
        fn message_type(&self) -> &'static str {
            BasicMessage::MESSAGE_TYPE
        }

        async fn handle(
            &self,
            ctx: InboundMessageContext,
        ) -> Result<Option<OutboundMessage>, AgentError> {
            let connection = ctx.assert_ready_connection()?.clone();
            Ok(Some(OutboundMessage::new(
                BasicMessage::new("echo".to_string()),
                connection,
            )))
        }
    }

    fn build_connection() -> ConnectionRecord {
        let mut record = ConnectionRecord::new(
            ConnectionRole::Inviter,
            "did:sov:1".to_string(),
            "verkey-1".to_string(),
        );
        record.state = ConnectionState::Complete;
        record
    }

    #[tokio::test]
    async fn test_dispatch_sends_reply() {
        let mut transport = MockFakeTransport::new();
        transport.expect_send().times(1).returning(|_| Ok(()));

        let mut dispatcher = Dispatcher::new(Arc::new(transport));
        let registered = dispatcher.register_handler(Arc::new(EchoHandler));
        assert!(!registered.is_err());

        let ctx = InboundMessageContext::new(AgentMessage::from(BasicMessage::new(
            "hello".to_string(),
        )))
        .with_connection(Some(build_connection()));

        let outbound = dispatcher.dispatch(ctx).await;
        assert!(!outbound.is_err());
        assert!(outbound.unwrap().is_some())
    }

    #[tokio::test]
    async fn test_dispatch_unhandled() {
        let transport = MockFakeTransport::new();
        let dispatcher = Dispatcher::new(Arc::new(transport));

        let ctx = InboundMessageContext::new(AgentMessage::from(BasicMessage::new(
            "hello".to_string(),
        )));

        let outbound = dispatcher.dispatch(ctx).await;
        assert!(matches!(
            outbound.unwrap_err(),
            AgentError::UnhandledMessageType(_)
        ))
    }

    #[tokio::test]
    async fn test_handler_error_propagated() {
        let mut transport = MockFakeTransport::new();
        transport.expect_send().times(0);

        let mut dispatcher = Dispatcher::new(Arc::new(transport));
        let _ = dispatcher.register_handler(Arc::new(EchoHandler));

        let ctx = InboundMessageContext::new(AgentMessage::from(BasicMessage::new(
            "hello".to_string(),
        )));

        let outbound = dispatcher.dispatch(ctx).await;
        assert!(matches!(
            outbound.unwrap_err(),
            AgentError::ConnectionNotReady(_)
        ))
    }

    #[test]
    fn test_duplicate_handler() {
        let transport = MockFakeTransport::new();
        let mut dispatcher = Dispatcher::new(Arc::new(transport));

        let _ = dispatcher.register_handler(Arc::new(EchoHandler));
        let duplicated = dispatcher.register_handler(Arc::new(EchoHandler));
        assert!(matches!(
            duplicated.unwrap_err(),
            AgentError::DuplicateHandler(_)
        ));
        assert!(dispatcher.has_handler(BasicMessage::MESSAGE_TYPE))
    }
}
