use std::sync::Arc;

use prople_aries_core::agent::types::TransportBuilder;
use prople_aries_core::agent::{AgentDependencies, AgentError, OutboundMessage};
use prople_aries_core::basicmessage::{BasicMessageRecord, BasicMessageService};
use prople_aries_core::connection::ConnectionService;
use prople_aries_core::storage::types::{TagQuery, TAG_CONNECTION_ID};

#[derive(Clone)]
pub struct BasicMessagesModule {
    service: BasicMessageService,
    connections: ConnectionService,
    transport: Arc<dyn TransportBuilder>,
}

impl BasicMessagesModule {
    pub fn new(deps: &AgentDependencies) -> Self {
        Self {
            service: BasicMessageService::new(deps),
            connections: ConnectionService::new(deps),
            transport: deps.transport.clone(),
        }
    }

    pub async fn send_message(
        &self,
        connection_id: &str,
        message: &str,
    ) -> Result<BasicMessageRecord, AgentError> {
        self.send(connection_id, message, None).await
    }

    /// `send_reply` threads the new message under `parent_thread_id`
    pub async fn send_reply(
        &self,
        connection_id: &str,
        message: &str,
        parent_thread_id: &str,
    ) -> Result<BasicMessageRecord, AgentError> {
        self.send(connection_id, message, Some(parent_thread_id.to_string()))
            .await
    }

    pub async fn find_by_connection_id(
        &self,
        connection_id: &str,
    ) -> Result<Vec<BasicMessageRecord>, AgentError> {
        self.service
            .find_by_query(TagQuery::new().with(TAG_CONNECTION_ID, connection_id))
            .await
    }

    pub async fn find_all_by_query(
        &self,
        query: TagQuery,
    ) -> Result<Vec<BasicMessageRecord>, AgentError> {
        self.service.find_by_query(query).await
    }

    pub async fn get_by_id(&self, record_id: &str) -> Result<BasicMessageRecord, AgentError> {
        self.service.get_by_id(record_id).await
    }

    pub async fn delete_by_id(&self, record_id: &str) -> Result<(), AgentError> {
        self.service.delete_by_id(record_id).await
    }

    async fn send(
        &self,
        connection_id: &str,
        message: &str,
        parent_thread_id: Option<String>,
    ) -> Result<BasicMessageRecord, AgentError> {
        if connection_id.trim().is_empty() {
            return Err(AgentError::ValidationError(
                "basic message: connection id is missing".to_string(),
            ));
        }

        if message.trim().is_empty() {
            return Err(AgentError::ValidationError(
                "basic message: content is missing".to_string(),
            ));
        }

        let connection = self.connections.get_by_id(connection_id).await?;
        let (basic_message, record) = self
            .service
            .create_message(&connection, message, parent_thread_id)
            .await?;

        self.transport
            .send(OutboundMessage::new(basic_message, connection))
            .await?;
        Ok(record)
    }
}
