use rst_common::standard::async_trait::async_trait;
use rst_common::with_logging::log::debug;

use crate::agent::context::{InboundMessageContext, OutboundMessage};
use crate::agent::dispatcher::MessageHandler;
use crate::agent::message::DidCommMessage;
use crate::agent::types::AgentError;
use crate::routing::MediationService;

use super::messages::{
    ConnectionRequestMessage, ConnectionResponseMessage, TrustPingMessage,
    TrustPingResponseMessage,
};
use super::service::ConnectionService;
use super::types::TrustPingOptions;

pub struct ConnectionRequestHandler {
    service: ConnectionService,
    mediation: MediationService,
    auto_accept_connections: bool,
    endpoint: Option<String>,
}

impl ConnectionRequestHandler {
    pub fn new(
        service: ConnectionService,
        mediation: MediationService,
        auto_accept_connections: bool,
        endpoint: Option<String>,
    ) -> Self {
        Self {
            service,
            mediation,
            auto_accept_connections,
            endpoint,
        }
    }
}

#[async_trait]
impl MessageHandler for ConnectionRequestHandler {
    fn message_type(&self) -> &'static str {
        ConnectionRequestMessage::MESSAGE_TYPE
    }

    async fn handle(
        &self,
        ctx: InboundMessageContext,
    ) -> Result<Option<OutboundMessage>, AgentError> {
        let record = self.service.process_request(&ctx).await?;

        let auto_accept = record
            .get_auto_accept_connection()
            .unwrap_or(self.auto_accept_connections);
        if !auto_accept {
            debug!("connection: request on {} waits for acceptance", record.get_id());
            return Ok(None);
        }

        let routing = self.mediation.get_routing(self.endpoint.to_owned()).await?;
        let (response, record) = self
            .service
            .create_response(&record.get_id(), routing)
            .await?;

        Ok(Some(OutboundMessage::new(response, record)))
    }
}

/// `ConnectionResponseHandler` answers a response with a trust ping to complete the connection
pub struct ConnectionResponseHandler {
    service: ConnectionService,
}

impl ConnectionResponseHandler {
    pub fn new(service: ConnectionService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl MessageHandler for ConnectionResponseHandler {
    fn message_type(&self) -> &'static str {
        ConnectionResponseMessage::MESSAGE_TYPE
    }

    async fn handle(
        &self,
        ctx: InboundMessageContext,
    ) -> Result<Option<OutboundMessage>, AgentError> {
        let record = self.service.process_response(&ctx).await?;

        let options = TrustPingOptions {
            response_requested: false,
            comment: None,
        };

        let (ping, record) = self
            .service
            .create_trust_ping(&record.get_id(), options)
            .await?;

        Ok(Some(OutboundMessage::new(ping, record)))
    }
}

pub struct TrustPingHandler {
    service: ConnectionService,
}

impl TrustPingHandler {
    pub fn new(service: ConnectionService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl MessageHandler for TrustPingHandler {
    fn message_type(&self) -> &'static str {
        TrustPingMessage::MESSAGE_TYPE
    }

    async fn handle(
        &self,
        ctx: InboundMessageContext,
    ) -> Result<Option<OutboundMessage>, AgentError> {
        let (record, response) = self.service.process_ping(&ctx).await?;
        Ok(response.map(|message| OutboundMessage::new(message, record)))
    }
}

pub struct TrustPingResponseHandler {
    service: ConnectionService,
}

impl TrustPingResponseHandler {
    pub fn new(service: ConnectionService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl MessageHandler for TrustPingResponseHandler {
    fn message_type(&self) -> &'static str {
        TrustPingResponseMessage::MESSAGE_TYPE
    }

    async fn handle(
        &self,
        ctx: InboundMessageContext,
    ) -> Result<Option<OutboundMessage>, AgentError> {
        self.service.process_ping_response(&ctx).await?;
        Ok(None)
    }
}
