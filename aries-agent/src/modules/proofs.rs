use std::sync::Arc;

use prople_aries_core::agent::registry::AgentMessage;
use prople_aries_core::agent::types::TransportBuilder;
use prople_aries_core::agent::{AgentDependencies, AgentError, OutboundMessage};
use prople_aries_core::connection::ConnectionService;
use prople_aries_core::proofs::types::{
    AcceptProofProposalOptions, CreatePresentationOptions, CreateProofProposalOptions,
    CreateProofRequestOptions, ProofRequest, RequestedCredentials,
};
use prople_aries_core::proofs::{AutoAcceptProof, ProofExchangeRecord, ProofService};

#[derive(Clone)]
pub struct ProofsModule {
    service: ProofService,
    connections: ConnectionService,
    transport: Arc<dyn TransportBuilder>,
}

impl ProofsModule {
    pub fn new(deps: &AgentDependencies) -> Self {
        Self {
            service: ProofService::new(deps),
            connections: ConnectionService::new(deps),
            transport: deps.transport.clone(),
        }
    }

    pub async fn propose_proof(
        &self,
        connection_id: &str,
        options: CreateProofProposalOptions,
    ) -> Result<ProofExchangeRecord, AgentError> {
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
        options: AcceptProofProposalOptions,
    ) -> Result<ProofExchangeRecord, AgentError> {
        let (request, record) = self.service.accept_proposal(record_id, options).await?;
        self.send(request, &record).await?;
        Ok(record)
    }

    pub async fn request_proof(
        &self,
        connection_id: &str,
        proof_request: ProofRequest,
        auto_accept_proof: Option<AutoAcceptProof>,
    ) -> Result<ProofExchangeRecord, AgentError> {
        let connection = self.connections.get_by_id(connection_id).await?;
        let (request, record) = self
            .service
            .create_request(CreateProofRequestOptions {
                connection: connection.clone(),
                proof_request,
                auto_accept_proof,
                comment: None,
            })
            .await?;

        self.transport
            .send(OutboundMessage::new(request, connection))
            .await?;
        Ok(record)
    }

    /// `get_requested_credentials` picks the first wallet credential for every referent
    pub async fn get_requested_credentials(
        &self,
        record_id: &str,
    ) -> Result<RequestedCredentials, AgentError> {
        self.service.auto_select_credentials(record_id).await
    }

    pub async fn accept_request(
        &self,
        record_id: &str,
        options: CreatePresentationOptions,
    ) -> Result<ProofExchangeRecord, AgentError> {
        let (presentation, record) = self
            .service
            .create_presentation(record_id, options)
            .await?;

        self.send(presentation, &record).await?;
        Ok(record)
    }

    pub async fn accept_presentation(&self, record_id: &str) -> Result<ProofExchangeRecord, AgentError> {
        let (ack, record) = self.service.create_ack(record_id).await?;
        self.send(ack, &record).await?;
        Ok(record)
    }

    pub async fn abandon(&self, record_id: &str, reason: &str) -> Result<ProofExchangeRecord, AgentError> {
        self.service.abandon(record_id, reason).await
    }

    pub async fn get_all(&self) -> Result<Vec<ProofExchangeRecord>, AgentError> {
        self.service.get_all().await
    }

    pub async fn find_by_id(&self, record_id: &str) -> Result<Option<ProofExchangeRecord>, AgentError> {
        self.service.find_by_id(record_id).await
    }

    pub async fn get_by_id(&self, record_id: &str) -> Result<ProofExchangeRecord, AgentError> {
        self.service.get_by_id(record_id).await
    }

    pub async fn delete_by_id(&self, record_id: &str) -> Result<(), AgentError> {
        self.service.delete_by_id(record_id).await
    }

    async fn send(
        &self,
        message: impl Into<AgentMessage>,
        record: &ProofExchangeRecord,
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
