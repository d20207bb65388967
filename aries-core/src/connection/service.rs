use std::sync::Arc;

use rst_common::with_logging::log::{debug, info};
use rst_common::with_tokio::tokio::sync::OwnedMutexGuard;

use crate::agent::context::InboundMessageContext;
use crate::agent::dependencies::AgentDependencies;
use crate::agent::events::{ConnectionEvent, EventBus, TrustPingResponseEvent};
use crate::agent::lock::{ExchangeKey, ExchangeLocks};
use crate::agent::message::{generate_id, DidCommMessage, ThreadDecorator};
use crate::agent::state::ExchangeState;
use crate::agent::types::{AgentError, WalletBuilder};
use crate::storage::types::{TagQuery, TAG_ROLE, TAG_THREAD_ID};
use crate::routing::Routing;
use crate::storage::Repository;

use super::messages::{
    Connection, ConnectionInvitationMessage, ConnectionRequestMessage, ConnectionResponseMessage,
    DidDoc, TrustPingMessage, TrustPingResponseMessage,
};
use super::record::ConnectionRecord;
use super::types::{
    ConnectionRequestOptions, ConnectionRole, ConnectionState, CreateInvitationOptions,
    ReceiveInvitationOptions, TrustPingOptions, PROTOCOL_NAME, TAG_INVITATION_KEY, TAG_THEIR_KEY,
    TAG_VERKEY,
};

/// `ConnectionService` runs the connection handshake
///
/// ```text
/// inviter: invited -> (request) requested -> (response sent) responded -> (ping) complete
/// invitee: invited -> (request sent) requested -> (response) responded -> (ping sent) complete
/// ```
#[derive(Clone)]
pub struct ConnectionService {
    repo: Repository<ConnectionRecord>,
    wallet: Arc<dyn WalletBuilder>,
    events: EventBus,
    locks: ExchangeLocks,
}

impl ConnectionService {
    pub fn new(deps: &AgentDependencies) -> Self {
        Self {
            repo: deps.repository(),
            wallet: deps.wallet.clone(),
            events: deps.events.clone(),
            locks: deps.locks.clone(),
        }
    }

    pub async fn create_invitation(
        &self,
        options: CreateInvitationOptions,
    ) -> Result<(ConnectionInvitationMessage, ConnectionRecord), AgentError> {
        let did_info = self
            .wallet
            .create_did()
            .await
            .map_err(|err| AgentError::collaborator("create_did", "connection", err))?;

        let mut invitation = ConnectionInvitationMessage::new(
            options.label,
            vec![did_info.verkey.to_owned()],
            &options.routing,
        );
        invitation.image_url = options.image_url;

        let mut record =
            ConnectionRecord::new(ConnectionRole::Inviter, did_info.did, did_info.verkey);
        record.invitation = Some(invitation.clone());
        record.auto_accept_connection = options.auto_accept_connection;
        record.alias = options.alias;

        self.repo.save(&record).await?;
        self.publish(&record);

        info!("connection: invitation created for {}", record.id);
        Ok((invitation, record))
    }

    pub async fn receive_invitation(
        &self,
        invitation: ConnectionInvitationMessage,
        options: ReceiveInvitationOptions,
    ) -> Result<ConnectionRecord, AgentError> {
        invitation.validate()?;

        let did_info = self
            .wallet
            .create_did()
            .await
            .map_err(|err| AgentError::collaborator("create_did", &invitation.id, err))?;

        let mut record =
            ConnectionRecord::new(ConnectionRole::Invitee, did_info.did, did_info.verkey);
        record.their_label = Some(invitation.label.to_owned());
        record.invitation = Some(invitation);
        record.auto_accept_connection = options.auto_accept_connection;
        record.alias = options.alias;

        self.repo.save(&record).await?;
        self.publish(&record);

        info!("connection: invitation received as {}", record.id);
        Ok(record)
    }

    pub async fn create_request(
        &self,
        connection_id: &str,
        options: ConnectionRequestOptions,
    ) -> Result<(ConnectionRequestMessage, ConnectionRecord), AgentError> {
        let _guard = self.lock_record(connection_id).await;
        let mut record = self.repo.get_by_id(connection_id).await?;

        Self::assert_role(&record, ConnectionRole::Invitee)?;
        record.state.assert_in(&[ConnectionState::Invited])?;

        let message = ConnectionRequestMessage {
            id: generate_id(),
            thread: None,
            label: options.label,
            connection: Connection {
                did: record.did.to_owned(),
                did_doc: Some(DidDoc::new(&record.did, &record.verkey, &options.routing)),
            },
            image_url: options.image_url,
        };

        record.thread_id = Some(message.get_thread_id());
        self.update_state(&mut record, ConnectionState::Requested)
            .await?;

        Ok((message, record))
    }

    /// `process_request` correlates the request through the invitation key it was sent to
    pub async fn process_request(
        &self,
        ctx: &InboundMessageContext,
    ) -> Result<ConnectionRecord, AgentError> {
        let message: ConnectionRequestMessage = ctx.message.clone().try_into()?;
        let invitation_key = ctx.recipient_verkey.to_owned().ok_or_else(|| {
            AgentError::ValidationError("connection request has no recipient key".to_string())
        })?;

        let query = TagQuery::new()
            .with(TAG_INVITATION_KEY, invitation_key.as_str())
            .with(TAG_ROLE, ConnectionRole::Inviter.as_str());

        let found = self.repo.find_single_by_query(query).await?.ok_or_else(|| {
            AgentError::ConnectionNotFound(format!("no invitation for key {}", invitation_key))
        })?;

        let _guard = self.lock_record(&found.id).await;
        let mut record = self.repo.get_by_id(&found.id).await?;
        record.state.assert_in(&[ConnectionState::Invited])?;

        let did_doc = message.connection.did_doc.to_owned().ok_or_else(|| {
            AgentError::ValidationError("connection request has no did doc".to_string())
        })?;

        record.their_key = did_doc
            .recipient_key()
            .or_else(|| ctx.sender_verkey.to_owned());
        record.their_did = Some(message.connection.did.to_owned());
        record.their_did_doc = Some(did_doc);
        record.their_label = Some(message.label.to_owned());
        record.thread_id = Some(message.get_thread_id());

        self.update_state(&mut record, ConnectionState::Requested)
            .await?;
        Ok(record)
    }

    pub async fn create_response(
        &self,
        connection_id: &str,
        routing: Routing,
    ) -> Result<(ConnectionResponseMessage, ConnectionRecord), AgentError> {
        let _guard = self.lock_record(connection_id).await;
        let mut record = self.repo.get_by_id(connection_id).await?;

        Self::assert_role(&record, ConnectionRole::Inviter)?;
        record.state.assert_in(&[ConnectionState::Requested])?;

        let thread_id = record.thread_id.to_owned().ok_or_else(|| {
            AgentError::ValidationError(format!("connection {} has no thread", record.id))
        })?;

        let message = ConnectionResponseMessage {
            id: generate_id(),
            thread: Some(ThreadDecorator::new(thread_id)),
            connection: Connection {
                did: record.did.to_owned(),
                did_doc: Some(DidDoc::new(&record.did, &record.verkey, &routing)),
            },
        };

        self.update_state(&mut record, ConnectionState::Responded)
            .await?;
        Ok((message, record))
    }

    pub async fn process_response(
        &self,
        ctx: &InboundMessageContext,
    ) -> Result<ConnectionRecord, AgentError> {
        let message: ConnectionResponseMessage = ctx.message.clone().try_into()?;
        let thread_id = message.get_thread_id();

        let query = TagQuery::new()
            .with(TAG_THREAD_ID, thread_id.as_str())
            .with(TAG_ROLE, ConnectionRole::Invitee.as_str());

        let found = self.repo.find_single_by_query(query).await?.ok_or_else(|| {
            AgentError::ConnectionNotFound(format!("no connection for thread {}", thread_id))
        })?;

        let _guard = self.lock_record(&found.id).await;
        let mut record = self.repo.get_by_id(&found.id).await?;
        record.state.assert_in(&[ConnectionState::Requested])?;

        let did_doc = message.connection.did_doc.to_owned().ok_or_else(|| {
            AgentError::ValidationError("connection response has no did doc".to_string())
        })?;

        record.their_key = did_doc
            .recipient_key()
            .or_else(|| ctx.sender_verkey.to_owned());
        record.their_did = Some(message.connection.did.to_owned());
        record.their_did_doc = Some(did_doc);

        self.update_state(&mut record, ConnectionState::Responded)
            .await?;
        Ok(record)
    }

    /// `create_trust_ping` completes a responded connection on the sending side
    pub async fn create_trust_ping(
        &self,
        connection_id: &str,
        options: TrustPingOptions,
    ) -> Result<(TrustPingMessage, ConnectionRecord), AgentError> {
        let _guard = self.lock_record(connection_id).await;
        let mut record = self.repo.get_by_id(connection_id).await?;
        record
            .state
            .assert_in(&[ConnectionState::Responded, ConnectionState::Complete])?;

        let message = TrustPingMessage {
            id: generate_id(),
            thread: None,
            comment: options.comment,
            response_requested: options.response_requested,
        };

        if record.state == ConnectionState::Responded {
            self.update_state(&mut record, ConnectionState::Complete)
                .await?;
        }

        Ok((message, record))
    }

    /// `process_ping` completes a responded connection on the receiving side and builds the
    /// response when the sender asked for one
    pub async fn process_ping(
        &self,
        ctx: &InboundMessageContext,
    ) -> Result<(ConnectionRecord, Option<TrustPingResponseMessage>), AgentError> {
        let message: TrustPingMessage = ctx.message.clone().try_into()?;
        let connection = ctx.assert_ready_connection()?;

        let _guard = self.lock_record(&connection.id).await;
        let mut record = self.repo.get_by_id(&connection.id).await?;

        if record.state == ConnectionState::Responded {
            self.update_state(&mut record, ConnectionState::Complete)
                .await?;
        }

        let response = message.response_requested.then(|| TrustPingResponseMessage {
            id: generate_id(),
            thread: Some(ThreadDecorator::new(message.get_thread_id())),
            comment: None,
        });

        Ok((record, response))
    }

    /// `process_ping_response` leaves the connection untouched and only notifies subscribers
    pub async fn process_ping_response(
        &self,
        ctx: &InboundMessageContext,
    ) -> Result<ConnectionRecord, AgentError> {
        let _: TrustPingResponseMessage = ctx.message.clone().try_into()?;
        let connection = ctx.assert_ready_connection()?.clone();

        debug!("connection: ping response received on {}", connection.id);
        self.events.publish(TrustPingResponseEvent {
            record: connection.clone(),
        });

        Ok(connection)
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<ConnectionRecord>, AgentError> {
        self.repo.find_by_id(id).await.map_err(AgentError::from)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<ConnectionRecord, AgentError> {
        self.repo.get_by_id(id).await.map_err(AgentError::from)
    }

    pub async fn get_all(&self) -> Result<Vec<ConnectionRecord>, AgentError> {
        self.repo.get_all().await.map_err(AgentError::from)
    }

    pub async fn delete_by_id(&self, id: &str) -> Result<(), AgentError> {
        self.repo.delete_by_id(id).await.map_err(AgentError::from)
    }

    /// `find_by_keys` resolves the connection of an inbound envelope, by our key first and by the
    /// sender's key otherwise
    pub async fn find_by_keys(
        &self,
        sender_verkey: Option<String>,
        recipient_verkey: Option<String>,
    ) -> Result<Option<ConnectionRecord>, AgentError> {
        if let Some(verkey) = recipient_verkey {
            let found = self
                .repo
                .find_single_by_query(TagQuery::new().with(TAG_VERKEY, verkey))
                .await?;

            if found.is_some() {
                return Ok(found);
            }
        }

        match sender_verkey {
            Some(their_key) => self
                .repo
                .find_single_by_query(TagQuery::new().with(TAG_THEIR_KEY, their_key))
                .await
                .map_err(AgentError::from),
            None => Ok(None),
        }
    }

    async fn update_state(
        &self,
        record: &mut ConnectionRecord,
        state: ConnectionState,
    ) -> Result<(), AgentError> {
        record.state.assert_transition(state)?;

        debug!(
            "connection: {} moving from {} to {}",
            record.id, record.state, state
        );

        record.state = state;
        self.repo.update(record).await?;
        self.publish(record);
        Ok(())
    }

    fn publish(&self, record: &ConnectionRecord) {
        self.events.publish(ConnectionEvent {
            record: record.clone(),
        });
    }

    fn assert_role(record: &ConnectionRecord, role: ConnectionRole) -> Result<(), AgentError> {
        if record.role != role {
            return Err(AgentError::ValidationError(format!(
                "connection {} has role {}, expected {}",
                record.id,
                record.role.as_str(),
                role.as_str()
            )));
        }

        Ok(())
    }

    async fn lock_record(&self, connection_id: &str) -> OwnedMutexGuard<()> {
        self.locks
            .acquire(ExchangeKey::new(PROTOCOL_NAME, connection_id, Some(connection_id)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rst_common::with_tokio::tokio;

    use crate::agent::events::ConnectionEvent;
    use crate::agent::registry::AgentMessage;
    use crate::agent::testutil::{build_dependencies, FakeCollaborators};

    fn routing() -> Routing {
        Routing {
            endpoint: Some("https://agent.example.com".to_string()),
            routing_keys: vec![],
            mediator_id: None,
        }
    }

    fn invitation_options() -> CreateInvitationOptions {
        CreateInvitationOptions {
            label: "faber".to_string(),
            routing: routing(),
            ..Default::default()
        }
    }

    fn request_options() -> ConnectionRequestOptions {
        ConnectionRequestOptions {
            label: "alice".to_string(),
            image_url: None,
            routing: routing(),
        }
    }

    #[tokio::test]
    async fn test_full_handshake() {
        let faber_deps = build_dependencies(FakeCollaborators::with_dids("faber"));
        let alice_deps = build_dependencies(FakeCollaborators::with_dids("alice"));
        let faber = ConnectionService::new(&faber_deps);
        let alice = ConnectionService::new(&alice_deps);

        let mut faber_events = faber_deps.events.listen();

        let (invitation, faber_record) = faber.create_invitation(invitation_options()).await.unwrap();
        assert_eq!(faber_record.state, ConnectionState::Invited);

        let alice_record = alice
            .receive_invitation(invitation.clone(), ReceiveInvitationOptions::default())
            .await
            .unwrap();
        assert_eq!(alice_record.their_label, Some("faber".to_string()));

        let (request, alice_record) = alice
            .create_request(&alice_record.id, request_options())
            .await
            .unwrap();
        assert_eq!(alice_record.state, ConnectionState::Requested);
        assert_eq!(alice_record.thread_id, Some(request.id.to_owned()));

        let ctx = InboundMessageContext::new(AgentMessage::from(request.clone())).with_keys(
            Some(alice_record.verkey.to_owned()),
            Some(invitation.recipient_keys[0].to_owned()),
        );
        let faber_record = faber.process_request(&ctx).await.unwrap();
        assert_eq!(faber_record.state, ConnectionState::Requested);
        assert_eq!(faber_record.their_key, Some(alice_record.verkey.to_owned()));
        assert_eq!(faber_record.their_label, Some("alice".to_string()));

        let (response, faber_record) = faber
            .create_response(&faber_record.id, routing())
            .await
            .unwrap();
        assert_eq!(faber_record.state, ConnectionState::Responded);
        assert_eq!(response.get_thread_id(), request.id);

        let ctx = InboundMessageContext::new(AgentMessage::from(response));
        let alice_record = alice.process_response(&ctx).await.unwrap();
        assert_eq!(alice_record.state, ConnectionState::Responded);
        assert_eq!(alice_record.their_did, Some(faber_record.did.to_owned()));

        let (ping, alice_record) = alice
            .create_trust_ping(&alice_record.id, TrustPingOptions::default())
            .await
            .unwrap();
        assert_eq!(alice_record.state, ConnectionState::Complete);

        let ctx = InboundMessageContext::new(AgentMessage::from(ping.clone()))
            .with_connection(Some(faber_record));
        let (faber_record, ping_response) = faber.process_ping(&ctx).await.unwrap();
        assert_eq!(faber_record.state, ConnectionState::Complete);
        assert_eq!(ping_response.unwrap().get_thread_id(), ping.id);

        let states: Vec<ConnectionState> = {
            let mut collected = Vec::new();
            for _ in 0..4 {
                let event = faber_events.next_event::<ConnectionEvent>().await.unwrap();
                collected.push(event.record.state);
            }
            collected
        };
        assert_eq!(
            states,
            vec![
                ConnectionState::Invited,
                ConnectionState::Requested,
                ConnectionState::Responded,
                ConnectionState::Complete
            ]
        )
    }

    #[tokio::test]
    async fn test_create_request_wrong_state() {
        let deps = build_dependencies(FakeCollaborators::with_dids("alice"));
        let alice = ConnectionService::new(&deps);

        let faber_deps = build_dependencies(FakeCollaborators::with_dids("faber"));
        let faber = ConnectionService::new(&faber_deps);
        let (invitation, _) = faber.create_invitation(invitation_options()).await.unwrap();

        let record = alice
            .receive_invitation(invitation, ReceiveInvitationOptions::default())
            .await
            .unwrap();
        let _ = alice.create_request(&record.id, request_options()).await;

        let again = alice.create_request(&record.id, request_options()).await;
        assert!(matches!(again.unwrap_err(), AgentError::InvalidState { .. }));

        let stored = alice.get_by_id(&record.id).await.unwrap();
        assert_eq!(stored.state, ConnectionState::Requested)
    }

    #[tokio::test]
    async fn test_process_request_unknown_invitation() {
        let deps = build_dependencies(FakeCollaborators::with_dids("faber"));
        let faber = ConnectionService::new(&deps);

        let request = ConnectionRequestMessage {
            id: generate_id(),
            thread: None,
            label: "alice".to_string(),
            connection: Connection {
                did: "did:alice".to_string(),
                did_doc: None,
            },
            image_url: None,
        };

        let ctx = InboundMessageContext::new(AgentMessage::from(request))
            .with_keys(None, Some("unknown-key".to_string()));
        let processed = faber.process_request(&ctx).await;
        assert!(matches!(
            processed.unwrap_err(),
            AgentError::ConnectionNotFound(_)
        ))
    }

    #[tokio::test]
    async fn test_receive_invalid_invitation() {
        let deps = build_dependencies(FakeCollaborators::with_dids("alice"));
        let alice = ConnectionService::new(&deps);

        let invitation = ConnectionInvitationMessage::new("faber".to_string(), vec![], &routing());
        let received = alice
            .receive_invitation(invitation, ReceiveInvitationOptions::default())
            .await;
        assert!(matches!(received.unwrap_err(), AgentError::Message(_)));

        let all = alice.get_all().await.unwrap();
        assert!(all.is_empty())
    }

    #[tokio::test]
    async fn test_ping_response_publishes_without_state_change() {
        let deps = build_dependencies(FakeCollaborators::with_dids("alice"));
        let alice = ConnectionService::new(&deps);
        let mut events = deps.events.listen();

        let mut connection = ConnectionRecord::new(
            ConnectionRole::Invitee,
            "did:alice".to_string(),
            "alice-key".to_string(),
        );
        connection.state = ConnectionState::Complete;

        let response = TrustPingResponseMessage {
            id: generate_id(),
            thread: Some(ThreadDecorator::new("ping-1".to_string())),
            comment: None,
        };

        let ctx = InboundMessageContext::new(AgentMessage::from(response))
            .with_connection(Some(connection.clone()));
        let record = alice.process_ping_response(&ctx).await.unwrap();
        assert_eq!(record.state, ConnectionState::Complete);

        let event = events.next_event::<TrustPingResponseEvent>().await.unwrap();
        assert_eq!(event.record, connection)
    }

    #[tokio::test]
    async fn test_find_by_keys() {
        let deps = build_dependencies(FakeCollaborators::with_dids("faber"));
        let faber = ConnectionService::new(&deps);
        let (_, record) = faber.create_invitation(invitation_options()).await.unwrap();

        let found = faber
            .find_by_keys(Some("unknown".to_string()), Some(record.verkey.to_owned()))
            .await
            .unwrap();
        assert_eq!(found.map(|conn| conn.id), Some(record.id));

        let missing = faber.find_by_keys(None, Some("unknown".to_string())).await;
        assert!(missing.unwrap().is_none())
    }
}
