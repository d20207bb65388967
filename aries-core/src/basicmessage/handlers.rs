use rst_common::standard::async_trait::async_trait;

use crate::agent::context::{InboundMessageContext, OutboundMessage};
use crate::agent::dispatcher::MessageHandler;
use crate::agent::message::DidCommMessage;
use crate::agent::types::AgentError;

use super::messages::BasicMessage;
use super::service::BasicMessageService;

pub struct BasicMessageHandler {
    service: BasicMessageService,
}

impl BasicMessageHandler {
    pub fn new(service: BasicMessageService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl MessageHandler for BasicMessageHandler {
    fn message_type(&self) -> &'static str {
        BasicMessage::MESSAGE_TYPE
    }

    async fn handle(
        &self,
        ctx: InboundMessageContext,
    ) -> Result<Option<OutboundMessage>, AgentError> {
        self.service.save(&ctx).await?;
        Ok(None)
    }
}
