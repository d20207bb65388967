use rst_common::with_logging::log::debug;

use crate::agent::context::InboundMessageContext;
use crate::agent::dependencies::AgentDependencies;
use crate::agent::events::{BasicMessageEvent, EventBus};
use crate::agent::types::AgentError;
use crate::connection::ConnectionRecord;
use crate::storage::types::TagQuery;
use crate::storage::Repository;

use super::messages::BasicMessage;
use super::record::{BasicMessageRecord, BasicMessageRole};

/// `BasicMessageService` stores every message sent or received as its own record
///
/// There is no state machine, a record is created and its event published in one step.
#[derive(Clone)]
pub struct BasicMessageService {
    repo: Repository<BasicMessageRecord>,
    events: EventBus,
}

impl BasicMessageService {
    pub fn new(deps: &AgentDependencies) -> Self {
        Self {
            repo: deps.repository(),
            events: deps.events.clone(),
        }
    }

    pub async fn create_message(
        &self,
        connection: &ConnectionRecord,
        content: &str,
        parent_thread_id: Option<String>,
    ) -> Result<(BasicMessage, BasicMessageRecord), AgentError> {
        if content.trim().is_empty() {
            return Err(AgentError::ValidationError(
                "basic message content is empty".to_string(),
            ));
        }

        if !connection.is_ready() {
            return Err(AgentError::ConnectionNotReady(format!(
                "connection {} is in state {}",
                connection.get_id(),
                connection.get_state()
            )));
        }

        let message = BasicMessage::new(content.to_string()).with_parent_thread(parent_thread_id);
        let record =
            BasicMessageRecord::new(connection.get_id(), BasicMessageRole::Sender, &message);

        self.repo.save(&record).await?;
        self.publish(&record);

        Ok((message, record))
    }

    /// `save` stores an inbound message received over a ready connection
    pub async fn save(&self, ctx: &InboundMessageContext) -> Result<BasicMessageRecord, AgentError> {
        let message: BasicMessage = ctx.message.clone().try_into()?;
        let connection = ctx.assert_ready_connection()?;

        let record =
            BasicMessageRecord::new(connection.get_id(), BasicMessageRole::Receiver, &message);

        self.repo.save(&record).await?;
        debug!(
            "basicmessage: received {} on connection {}",
            record.id, record.connection_id
        );

        self.publish(&record);
        Ok(record)
    }

    pub async fn find_by_id(&self, record_id: &str) -> Result<Option<BasicMessageRecord>, AgentError> {
        self.repo.find_by_id(record_id).await.map_err(AgentError::from)
    }

    pub async fn get_by_id(&self, record_id: &str) -> Result<BasicMessageRecord, AgentError> {
        self.repo.get_by_id(record_id).await.map_err(AgentError::from)
    }

    pub async fn find_by_query(
        &self,
        query: TagQuery,
    ) -> Result<Vec<BasicMessageRecord>, AgentError> {
        self.repo.find_by_query(query).await.map_err(AgentError::from)
    }

    pub async fn delete_by_id(&self, record_id: &str) -> Result<(), AgentError> {
        let record = self.get_by_id(record_id).await?;
        self.repo.delete(&record).await.map_err(AgentError::from)
    }

    fn publish(&self, record: &BasicMessageRecord) {
        self.events.publish(BasicMessageEvent {
            record: record.clone(),
        });
    }
}
