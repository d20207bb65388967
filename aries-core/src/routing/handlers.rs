use std::sync::Arc;

use rst_common::standard::async_trait::async_trait;
use rst_common::with_logging::log::warn;

use crate::agent::context::{InboundMessageContext, OutboundMessage};
use crate::agent::dispatcher::MessageHandler;
use crate::agent::message::DidCommMessage;
use crate::agent::types::{AgentError, TransportBuilder};

use super::messages::{
    BatchMessage, KeylistUpdateResponseMessage, MediationDenyMessage, MediationGrantMessage,
};
use super::service::MediationService;

pub struct MediationGrantHandler {
    service: MediationService,
}

impl MediationGrantHandler {
    pub fn new(service: MediationService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl MessageHandler for MediationGrantHandler {
    fn message_type(&self) -> &'static str {
        MediationGrantMessage::MESSAGE_TYPE
    }

    async fn handle(
        &self,
        ctx: InboundMessageContext,
    ) -> Result<Option<OutboundMessage>, AgentError> {
        self.service.process_grant(&ctx).await?;
        Ok(None)
    }
}

pub struct MediationDenyHandler {
    service: MediationService,
}

impl MediationDenyHandler {
    pub fn new(service: MediationService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl MessageHandler for MediationDenyHandler {
    fn message_type(&self) -> &'static str {
        MediationDenyMessage::MESSAGE_TYPE
    }

    async fn handle(
        &self,
        ctx: InboundMessageContext,
    ) -> Result<Option<OutboundMessage>, AgentError> {
        self.service.process_deny(&ctx).await?;
        Ok(None)
    }
}

pub struct KeylistUpdateResponseHandler {
    service: MediationService,
}

impl KeylistUpdateResponseHandler {
    pub fn new(service: MediationService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl MessageHandler for KeylistUpdateResponseHandler {
    fn message_type(&self) -> &'static str {
        KeylistUpdateResponseMessage::MESSAGE_TYPE
    }

    async fn handle(
        &self,
        ctx: InboundMessageContext,
    ) -> Result<Option<OutboundMessage>, AgentError> {
        self.service.process_keylist_update_response(&ctx).await?;
        Ok(None)
    }
}

/// `BatchHandler` feeds every picked up message back into the inbound path of the transport
pub struct BatchHandler {
    service: MediationService,
    transport: Arc<dyn TransportBuilder>,
}

impl BatchHandler {
    pub fn new(service: MediationService, transport: Arc<dyn TransportBuilder>) -> Self {
        Self { service, transport }
    }
}

#[async_trait]
impl MessageHandler for BatchHandler {
    fn message_type(&self) -> &'static str {
        BatchMessage::MESSAGE_TYPE
    }

    async fn handle(
        &self,
        ctx: InboundMessageContext,
    ) -> Result<Option<OutboundMessage>, AgentError> {
        let messages = self.service.process_batch(&ctx).await?;

        for packed in messages {
            if let Err(err) = self.transport.receive_packed(packed).await {
                warn!("mediation: queued message rejected: {}", err);
            }
        }

        Ok(None)
    }
}
