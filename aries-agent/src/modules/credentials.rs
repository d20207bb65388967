use std::sync::Arc;

use prople_aries_core::agent::registry::AgentMessage;
use prople_aries_core::agent::types::TransportBuilder;
use prople_aries_core::agent::{AgentDependencies, AgentError, OutboundMessage};
use prople_aries_core::connection::ConnectionService;
use prople_aries_core::credentials::messages::OfferCredentialMessage;
use prople_aries_core::credentials::types::{
    AcceptProposalOptions, CreateCredentialOptions, CreateOfferOptions, CreateProposalOptions,
    CreateRequestOptions,
};
use prople_aries_core::credentials::{CredentialExchangeRecord, CredentialService};

#[derive(Clone)]
pub struct CredentialsModule {
    service: CredentialService,
    connections: ConnectionService,
    transport: Arc<dyn TransportBuilder>,
}

impl CredentialsModule {
    pub fn new(deps: &AgentDependencies) -> Self {
        Self {
            service: CredentialService::new(deps),
            connections: ConnectionService::new(deps),
            transport: deps.transport.clone(),
        }
    }

    pub async fn propose_credential(
        &self,
        connection_id: &str,
        options: CreateProposalOptions,
    ) -> Result<CredentialExchangeRecord, AgentError> {
        let connection = self.connections.get_by_id(connection_id).await?;
        let (proposal, record) = self.service.create_proposal(&connection, options).await?;

        self.transport
            .send(OutboundMessage::new(proposal, connection))
            .await?;
        Ok(record)
    }

    pub async fn accept_proposal(
        &self,
        record_id: &str,
        options: AcceptProposalOptions,
    ) -> Result<CredentialExchangeRecord, AgentError> {
        let (offer, record) = self.service.accept_proposal(record_id, options).await?;
        self.send(offer, &record).await?;
        Ok(record)
    }

    /// `offer_credential` sends an offer over an established connection
    pub async fn offer_credential(
        &self,
        connection_id: &str,
        mut options: CreateOfferOptions,
    ) -> Result<CredentialExchangeRecord, AgentError> {
        let connection = self.connections.get_by_id(connection_id).await?;
        options.connection = Some(connection.clone());

        let (offer, record) = self.service.create_offer(options).await?;
        self.transport
            .send(OutboundMessage::new(offer, connection))
            .await?;
        Ok(record)
    }

    /// `create_connectionless_offer` returns the offer for out of band delivery, the exchange is
    /// bound to the connection the request later arrives on
    pub async fn create_connectionless_offer(
        &self,
        mut options: CreateOfferOptions,
    ) -> Result<(OfferCredentialMessage, CredentialExchangeRecord), AgentError> {
        options.connection = None;
        self.service.create_offer(options).await
    }

    pub async fn accept_offer(
        &self,
        record_id: &str,
        options: CreateRequestOptions,
    ) -> Result<CredentialExchangeRecord, AgentError> {
        let (request, record) = self.service.create_request(record_id, options).await?;
        self.send(request, &record).await?;
        Ok(record)
    }

    pub async fn accept_request(
        &self,
        record_id: &str,
        options: CreateCredentialOptions,
    ) -> Result<CredentialExchangeRecord, AgentError> {
        let (credential, record) = self.service.create_credential(record_id, options).await?;
        self.send(credential, &record).await?;
        Ok(record)
    }

    pub async fn accept_credential(
        &self,
        record_id: &str,
    ) -> Result<CredentialExchangeRecord, AgentError> {
        let (ack, record) = self.service.create_ack(record_id).await?;
        self.send(ack, &record).await?;
        Ok(record)
    }

    pub async fn abandon(
        &self,
        record_id: &str,
        reason: &str,
    ) -> Result<CredentialExchangeRecord, AgentError> {
        self.service.abandon(record_id, reason).await
    }

    pub async fn get_all(&self) -> Result<Vec<CredentialExchangeRecord>, AgentError> {
        self.service.get_all().await
    }

    pub async fn find_by_id(
        &self,
        record_id: &str,
    ) -> Result<Option<CredentialExchangeRecord>, AgentError> {
        self.service.find_by_id(record_id).await
    }

    pub async fn get_by_id(&self, record_id: &str) -> Result<CredentialExchangeRecord, AgentError> {
        self.service.get_by_id(record_id).await
    }

    pub async fn delete_by_id(&self, record_id: &str) -> Result<(), AgentError> {
        self.service.delete_by_id(record_id).await
    }

    async fn send(
        &self,
        message: impl Into<AgentMessage>,
        record: &CredentialExchangeRecord,
    ) -> Result<(), AgentError> {
        let connection = self
            .connections
            .get_by_id(&record.get_connection_id())
            .await?;

        self.transport
            .send(OutboundMessage::new(message, connection))
            .await
    }
}
