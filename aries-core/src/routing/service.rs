use rst_common::standard::serde_json::Value;
use rst_common::with_logging::log::{debug, info, warn};
use rst_common::with_tokio::tokio::sync::OwnedMutexGuard;

use crate::agent::context::InboundMessageContext;
use crate::agent::dependencies::AgentDependencies;
use crate::agent::events::{EventBus, MediationEvent};
use crate::agent::lock::{ExchangeKey, ExchangeLocks};
use crate::agent::message::{generate_id, DidCommMessage};
use crate::agent::state::ExchangeState;
use crate::agent::types::AgentError;
use crate::connection::ConnectionRecord;
use crate::storage::types::{StorageError, TagQuery, TAG_CONNECTION_ID, TAG_ROLE, TAG_STATE};
use crate::storage::Repository;

use super::messages::{
    BatchMessage, BatchPickupMessage, ForwardMessage, KeylistUpdate, KeylistUpdateMessage,
    KeylistUpdateResponseMessage, MediationDenyMessage, MediationGrantMessage,
    MediationRequestMessage,
};
use super::record::MediationRecord;
use super::types::{
    KeylistUpdateAction, KeylistUpdateResult, MediationRole, MediationState, Routing,
    PROTOCOL_NAME,
};

/// `MediationService` coordinates mediation with a mediator agent from the recipient side
#[derive(Clone)]
pub struct MediationService {
    repo: Repository<MediationRecord>,
    connections: Repository<ConnectionRecord>,
    events: EventBus,
    locks: ExchangeLocks,
}

impl MediationService {
    pub fn new(deps: &AgentDependencies) -> Self {
        Self {
            repo: deps.repository(),
            connections: deps.repository(),
            events: deps.events.clone(),
            locks: deps.locks.clone(),
        }
    }

    pub async fn create_request(
        &self,
        connection: &ConnectionRecord,
    ) -> Result<(MediationRequestMessage, MediationRecord), AgentError> {
        if !connection.is_ready() {
            return Err(AgentError::ConnectionNotReady(format!(
                "connection {} is in state {}",
                connection.get_id(),
                connection.get_state()
            )));
        }

        let message = MediationRequestMessage {
            id: generate_id(),
            thread: None,
            mediator_terms: vec![],
            recipient_terms: vec![],
        };

        let record = MediationRecord::new(
            connection.get_id(),
            message.get_thread_id(),
            MediationRole::Recipient,
        );

        self.repo.save(&record).await?;
        self.publish(&record);

        info!("mediation: requested on connection {}", record.connection_id);
        Ok((message, record))
    }

    pub async fn process_grant(
        &self,
        ctx: &InboundMessageContext,
    ) -> Result<MediationRecord, AgentError> {
        let message: MediationGrantMessage = ctx.message.clone().try_into()?;
        let connection = ctx.assert_ready_connection()?;
        let thread_id = message.get_thread_id();

        let _guard = self.lock_exchange(&thread_id, &connection.get_id()).await;
        let mut record = self.get_by_thread(&thread_id, &connection.get_id()).await?;
        record.state.assert_in(&[MediationState::Requested])?;

        record.endpoint = Some(message.endpoint.to_owned());
        record.routing_keys = message.routing_keys.to_owned();

        self.update_state(&mut record, MediationState::Granted)
            .await?;
        Ok(record)
    }

    pub async fn process_deny(
        &self,
        ctx: &InboundMessageContext,
    ) -> Result<MediationRecord, AgentError> {
        let message: MediationDenyMessage = ctx.message.clone().try_into()?;
        let connection = ctx.assert_ready_connection()?;
        let thread_id = message.get_thread_id();

        let _guard = self.lock_exchange(&thread_id, &connection.get_id()).await;
        let mut record = self.get_by_thread(&thread_id, &connection.get_id()).await?;
        record.state.assert_in(&[MediationState::Requested])?;

        self.update_state(&mut record, MediationState::Denied)
            .await?;
        Ok(record)
    }

    /// `create_keylist_update` asks the mediator to route messages for `verkey` to us
    pub async fn create_keylist_update(
        &self,
        mediation_id: &str,
        verkey: &str,
    ) -> Result<(KeylistUpdateMessage, ConnectionRecord), AgentError> {
        let record = self.get_granted(mediation_id).await?;
        let connection = self.get_connection(&record.connection_id).await?;

        let message = KeylistUpdateMessage {
            id: generate_id(),
            thread: None,
            updates: vec![KeylistUpdate {
                recipient_key: verkey.to_string(),
                action: KeylistUpdateAction::Add,
            }],
        };

        Ok((message, connection))
    }

    /// `process_keylist_update_response` applies the key changes the mediator confirmed
    pub async fn process_keylist_update_response(
        &self,
        ctx: &InboundMessageContext,
    ) -> Result<MediationRecord, AgentError> {
        let message: KeylistUpdateResponseMessage = ctx.message.clone().try_into()?;
        let connection = ctx.assert_ready_connection()?;

        let found = self
            .find_by_connection_id(&connection.get_id())
            .await?
            .ok_or_else(|| {
                AgentError::ValidationError(format!(
                    "no mediation on connection {}",
                    connection.get_id()
                ))
            })?;

        let _guard = self
            .lock_exchange(&found.thread_id, &found.connection_id)
            .await;
        let mut record = self.repo.get_by_id(&found.id).await?;
        record.state.assert_in(&[MediationState::Granted])?;

        for updated in message.updated.iter() {
            if updated.result != KeylistUpdateResult::Success
                && updated.result != KeylistUpdateResult::NoChange
            {
                warn!(
                    "mediation: keylist update for {} failed: {:?}",
                    updated.recipient_key, updated.result
                );
                continue;
            }

            match updated.action {
                KeylistUpdateAction::Add => {
                    if !record.recipient_keys.contains(&updated.recipient_key) {
                        record.recipient_keys.push(updated.recipient_key.to_owned());
                    }
                }
                KeylistUpdateAction::Remove => record
                    .recipient_keys
                    .retain(|key| key != &updated.recipient_key),
            }
        }

        self.repo.update(&mut record).await?;
        self.publish(&record);
        Ok(record)
    }

    pub async fn create_batch_pickup(
        &self,
        mediation_id: &str,
        batch_size: usize,
    ) -> Result<(BatchPickupMessage, ConnectionRecord), AgentError> {
        let record = self.get_granted(mediation_id).await?;
        let connection = self.get_connection(&record.connection_id).await?;

        let message = BatchPickupMessage {
            id: generate_id(),
            thread: None,
            batch_size,
        };

        Ok((message, connection))
    }

    /// `process_batch` returns the packed messages the mediator had queued for us
    pub async fn process_batch(&self, ctx: &InboundMessageContext) -> Result<Vec<Value>, AgentError> {
        let message: BatchMessage = ctx.message.clone().try_into()?;
        let connection = ctx.assert_ready_connection()?;

        let mediation = self.find_by_connection_id(&connection.get_id()).await?;
        if !mediation.map(|record| record.is_ready()).unwrap_or(false) {
            return Err(AgentError::ValidationError(format!(
                "batch received on connection {} without granted mediation",
                connection.get_id()
            )));
        }

        debug!("mediation: picked up {} messages", message.messages.len());
        Ok(message
            .messages
            .into_iter()
            .map(|item| item.message)
            .collect())
    }

    pub fn create_forward(&self, to: &str, packed: Value) -> ForwardMessage {
        ForwardMessage {
            id: generate_id(),
            thread: None,
            to: to.to_string(),
            msg: packed,
        }
    }

    /// `get_default_mediator` returns the first granted mediation
    pub async fn get_default_mediator(&self) -> Result<Option<MediationRecord>, AgentError> {
        let query = TagQuery::new()
            .with(TAG_STATE, MediationState::Granted.as_str())
            .with(TAG_ROLE, MediationRole::Recipient.as_str());

        let mut records = self.repo.find_by_query(query).await?;
        records.sort_by_key(|record| record.created_at);
        Ok(records.into_iter().next())
    }

    /// `get_routing` builds the routing of a new connection, through the default mediator
    /// when one was granted
    pub async fn get_routing(&self, default_endpoint: Option<String>) -> Result<Routing, AgentError> {
        match self.get_default_mediator().await? {
            Some(mediator) => Ok(Routing {
                endpoint: mediator.endpoint.to_owned().or(default_endpoint),
                routing_keys: mediator.routing_keys.to_owned(),
                mediator_id: Some(mediator.id),
            }),
            None => Ok(Routing {
                endpoint: default_endpoint,
                routing_keys: vec![],
                mediator_id: None,
            }),
        }
    }

    pub async fn find_by_connection_id(
        &self,
        connection_id: &str,
    ) -> Result<Option<MediationRecord>, AgentError> {
        self.repo
            .find_single_by_query(TagQuery::new().with(TAG_CONNECTION_ID, connection_id))
            .await
            .map_err(AgentError::from)
    }

    pub async fn find_by_id(&self, record_id: &str) -> Result<Option<MediationRecord>, AgentError> {
        self.repo.find_by_id(record_id).await.map_err(AgentError::from)
    }

    pub async fn get_by_id(&self, record_id: &str) -> Result<MediationRecord, AgentError> {
        self.repo.get_by_id(record_id).await.map_err(AgentError::from)
    }

    async fn get_by_thread(
        &self,
        thread_id: &str,
        connection_id: &str,
    ) -> Result<MediationRecord, AgentError> {
        self.repo
            .get_single_by_query(TagQuery::thread_and_connection(
                thread_id,
                Some(connection_id.to_string()),
            ))
            .await
            .map_err(AgentError::from)
    }

    async fn get_granted(&self, mediation_id: &str) -> Result<MediationRecord, AgentError> {
        let record = self.repo.get_by_id(mediation_id).await?;
        record.state.assert_in(&[MediationState::Granted])?;
        Ok(record)
    }

    async fn get_connection(&self, connection_id: &str) -> Result<ConnectionRecord, AgentError> {
        self.connections
            .get_by_id(connection_id)
            .await
            .map_err(|err| match err {
                StorageError::RecordNotFound(_) => {
                    AgentError::ConnectionNotFound(connection_id.to_string())
                }
                other => AgentError::Storage(other),
            })
    }

    async fn update_state(
        &self,
        record: &mut MediationRecord,
        state: MediationState,
    ) -> Result<(), AgentError> {
        record.state.assert_transition(state)?;

        debug!(
            "mediation: {} moving from {} to {}",
            record.id, record.state, state
        );

        record.state = state;
        self.repo.update(record).await?;
        self.publish(record);
        Ok(())
    }

    fn publish(&self, record: &MediationRecord) {
        self.events.publish(MediationEvent {
            record: record.clone(),
        });
    }

    async fn lock_exchange(&self, thread_id: &str, connection_id: &str) -> OwnedMutexGuard<()> {
        self.locks
            .acquire(ExchangeKey::new(PROTOCOL_NAME, thread_id, Some(connection_id)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rst_common::standard::serde_json::json;
    use rst_common::with_tokio::tokio;

    use crate::agent::message::ThreadDecorator;
    use crate::agent::registry::AgentMessage;
    use crate::agent::testutil::{build_dependencies, save_ready_connection, FakeCollaborators};
    use crate::routing::messages::{BatchItem, KeylistUpdated};

    fn inbound(message: impl Into<AgentMessage>, connection: &ConnectionRecord) -> InboundMessageContext {
        InboundMessageContext::new(message.into()).with_connection(Some(connection.clone()))
    }

    fn grant(thread_id: &str) -> MediationGrantMessage {
        MediationGrantMessage {
            id: generate_id(),
            thread: Some(ThreadDecorator::new(thread_id.to_string())),
            endpoint: "https://mediator.example.com".to_string(),
            routing_keys: vec!["mediator-key".to_string()],
        }
    }

    #[tokio::test]
    async fn test_request_and_grant() {
        let deps = build_dependencies(FakeCollaborators::new());
        let service = MediationService::new(&deps);
        let connection = save_ready_connection(&deps, "did:alice", "did:mediator").await;

        let routing = service
            .get_routing(Some("https://alice.example.com".to_string()))
            .await
            .unwrap();
        assert_eq!(routing.mediator_id, None);
        assert_eq!(routing.endpoint, Some("https://alice.example.com".to_string()));

        let (request, record) = service.create_request(&connection).await.unwrap();
        assert_eq!(record.get_state(), MediationState::Requested);

        let granted = service
            .process_grant(&inbound(grant(&request.id), &connection))
            .await
            .unwrap();
        assert_eq!(granted.get_state(), MediationState::Granted);
        assert_eq!(granted.get_routing_keys(), vec!["mediator-key".to_string()]);

        let routing = service
            .get_routing(Some("https://alice.example.com".to_string()))
            .await
            .unwrap();
        assert_eq!(routing.mediator_id, Some(record.get_id()));
        assert_eq!(
            routing.endpoint,
            Some("https://mediator.example.com".to_string())
        );
        assert_eq!(routing.routing_keys, vec!["mediator-key".to_string()])
    }

    #[tokio::test]
    async fn test_deny_then_grant_rejected() {
        let deps = build_dependencies(FakeCollaborators::new());
        let service = MediationService::new(&deps);
        let connection = save_ready_connection(&deps, "did:alice", "did:mediator").await;

        let (request, _) = service.create_request(&connection).await.unwrap();
        let deny = MediationDenyMessage {
            id: generate_id(),
            thread: Some(ThreadDecorator::new(request.id.to_owned())),
        };

        let denied = service.process_deny(&inbound(deny, &connection)).await.unwrap();
        assert_eq!(denied.get_state(), MediationState::Denied);

        let granted = service
            .process_grant(&inbound(grant(&request.id), &connection))
            .await;
        assert!(matches!(granted.unwrap_err(), AgentError::InvalidState { .. }));
        assert!(service.get_default_mediator().await.unwrap().is_none())
    }

    #[tokio::test]
    async fn test_keylist_update_roundtrip() {
        let deps = build_dependencies(FakeCollaborators::new());
        let service = MediationService::new(&deps);
        let connection = save_ready_connection(&deps, "did:alice", "did:mediator").await;

        let (request, record) = service.create_request(&connection).await.unwrap();

        let pending = service.create_keylist_update(&record.get_id(), "verkey-1").await;
        assert!(matches!(pending.unwrap_err(), AgentError::InvalidState { .. }));

        service
            .process_grant(&inbound(grant(&request.id), &connection))
            .await
            .unwrap();

        let (update, mediator_connection) = service
            .create_keylist_update(&record.get_id(), "verkey-1")
            .await
            .unwrap();
        assert_eq!(mediator_connection.get_id(), connection.get_id());
        assert_eq!(update.updates[0].recipient_key, "verkey-1".to_string());

        let response = KeylistUpdateResponseMessage {
            id: generate_id(),
            thread: Some(ThreadDecorator::new(update.id.to_owned())),
            updated: vec![
                KeylistUpdated {
                    recipient_key: "verkey-1".to_string(),
                    action: KeylistUpdateAction::Add,
                    result: KeylistUpdateResult::Success,
                },
                KeylistUpdated {
                    recipient_key: "verkey-2".to_string(),
                    action: KeylistUpdateAction::Add,
                    result: KeylistUpdateResult::ServerError,
                },
            ],
        };

        let updated = service
            .process_keylist_update_response(&inbound(response, &connection))
            .await
            .unwrap();
        assert_eq!(updated.get_recipient_keys(), vec!["verkey-1".to_string()])
    }

    #[tokio::test]
    async fn test_process_batch() {
        let deps = build_dependencies(FakeCollaborators::new());
        let service = MediationService::new(&deps);
        let connection = save_ready_connection(&deps, "did:alice", "did:mediator").await;

        let batch = BatchMessage {
            id: generate_id(),
            thread: None,
            messages: vec![BatchItem {
                id: "m-1".to_string(),
                message: json!({"protected": "abc"}),
            }],
        };

        let rejected = service.process_batch(&inbound(batch.clone(), &connection)).await;
        assert!(matches!(rejected.unwrap_err(), AgentError::ValidationError(_)));

        let (request, _) = service.create_request(&connection).await.unwrap();
        service
            .process_grant(&inbound(grant(&request.id), &connection))
            .await
            .unwrap();

        let messages = service.process_batch(&inbound(batch, &connection)).await.unwrap();
        assert_eq!(messages, vec![json!({"protected": "abc"})])
    }

    #[test]
    fn test_create_forward() {
        let deps = build_dependencies(FakeCollaborators::new());
        let service = MediationService::new(&deps);

        let forward = service.create_forward("their-key", json!({"ciphertext": "xyz"}));
        assert_eq!(forward.to, "their-key".to_string());
        assert_eq!(forward.msg, json!({"ciphertext": "xyz"}))
    }
}
