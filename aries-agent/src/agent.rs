use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rst_common::with_logging::log::{debug, info, warn};
use rst_common::with_tokio::tokio::sync::{Mutex, RwLock};
use rst_common::with_tokio::tokio::task::JoinHandle;

use prople_aries_core::agent::types::{
    LedgerBuilder, RevocationBuilder, TransportBuilder, WalletBuilder,
};
use prople_aries_core::agent::{
    AgentDependencies, AgentError, Dispatcher, EventBus, ExchangeLocks, InboundMessageContext,
    MessageHandler, MessageRegistry, OutboundMessage,
};
use prople_aries_core::basicmessage::handlers::BasicMessageHandler;
use prople_aries_core::basicmessage::BasicMessageService;
use prople_aries_core::connection::handlers::{
    ConnectionRequestHandler, ConnectionResponseHandler, TrustPingHandler,
    TrustPingResponseHandler,
};
use prople_aries_core::connection::ConnectionService;
use prople_aries_core::credentials::handlers::{
    CredentialAckHandler, IssueCredentialHandler, OfferCredentialHandler,
    ProposeCredentialHandler, RequestCredentialHandler,
};
use prople_aries_core::credentials::CredentialService;
use prople_aries_core::proofs::handlers::{
    PresentationAckHandler, PresentationHandler, ProposePresentationHandler,
    RequestPresentationHandler,
};
use prople_aries_core::proofs::ProofService;
use prople_aries_core::routing::handlers::{
    BatchHandler, KeylistUpdateResponseHandler, MediationDenyHandler, MediationGrantHandler,
};
use prople_aries_core::routing::MediationService;
use prople_aries_core::storage::types::StorageBuilder;

use crate::common::helpers;
use crate::common::types::CommonError;
use crate::config::Config;
use crate::modules::{
    BasicMessagesModule, ConnectionsModule, CredentialsModule, MediationModule, ProofsModule,
};

/// `Collaborators` are the external capabilities the host plugs into the agent
pub struct Collaborators {
    pub storage: Arc<dyn StorageBuilder>,
    pub wallet: Arc<dyn WalletBuilder>,
    pub ledger: Arc<dyn LedgerBuilder>,
    pub revocation: Arc<dyn RevocationBuilder>,
    pub transport: Arc<dyn TransportBuilder>,
}

/// `DecryptedMessage` is an inbound envelope after unpacking
#[derive(Debug, Clone)]
pub struct DecryptedMessage {
    pub plaintext: String,
    pub sender_verkey: Option<String>,
    pub recipient_verkey: Option<String>,
}

/// `Agent` owns the event bus, the registry, the dispatcher and the protocol modules for its
/// whole lifetime
pub struct Agent {
    config: Config,
    deps: AgentDependencies,
    registry: RwLock<MessageRegistry>,
    dispatcher: RwLock<Dispatcher>,
    connections: ConnectionsModule,
    credentials: CredentialsModule,
    proofs: ProofsModule,
    basic_messages: BasicMessagesModule,
    mediation: MediationModule,
    pickup: Mutex<Option<JoinHandle<()>>>,
    initialized: AtomicBool,
}

impl Agent {
    pub fn new(config: Config, collaborators: Collaborators) -> Result<Self, CommonError> {
        helpers::validate(config.clone())?;

        let deps = AgentDependencies {
            storage: collaborators.storage,
            wallet: collaborators.wallet,
            ledger: collaborators.ledger,
            revocation: collaborators.revocation,
            transport: collaborators.transport,
            events: EventBus::new(config.events().get_capacity()),
            locks: ExchangeLocks::new(),
        };

        let connections = ConnectionsModule::new(&deps, config.agent().clone());
        let mediation =
            MediationModule::new(&deps, connections.clone(), config.mediator().clone());

        Ok(Self {
            registry: RwLock::new(MessageRegistry::new()),
            dispatcher: RwLock::new(Dispatcher::new(deps.transport.clone())),
            credentials: CredentialsModule::new(&deps),
            proofs: ProofsModule::new(&deps),
            basic_messages: BasicMessagesModule::new(&deps),
            connections,
            mediation,
            pickup: Mutex::new(None),
            initialized: AtomicBool::new(false),
            config,
            deps,
        })
    }

    /// `initialize` registers every message type and handler, then provisions the configured
    /// mediator and starts its pickup loop
    ///
    /// Provisioning waits for the mediator handshake, the host must already be feeding inbound
    /// messages to [`Agent::receive_message`] from another task. Calling it again is a no-op.
    pub async fn initialize(&self) -> Result<(), CommonError> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.registry.write().await.register_builtin();
        {
            let mut dispatcher = self.dispatcher.write().await;
            for handler in self.handlers() {
                dispatcher.register_handler(handler)?;
            }
        }

        info!("agent: {} initialized", self.config.agent().get_label());

        if let Some(invitation_url) = self.config.mediator().get_invitation_url() {
            let mediation = self.mediation.provision(&invitation_url).await?;
            if !mediation.is_ready() {
                warn!(
                    "agent: mediation {} ended as {}",
                    mediation.get_id(),
                    mediation.get_state()
                );
            }
        }

        let pickup = self.mediation.start_pickup();
        *self.pickup.lock().await = pickup;
        Ok(())
    }

    /// `receive_message` decodes one decrypted message and dispatches it
    ///
    /// Returns the reply that was handed to the transport, if any. A failure only concerns this
    /// message.
    pub async fn receive_message(
        &self,
        message: DecryptedMessage,
    ) -> Result<Option<OutboundMessage>, AgentError> {
        let decoded = self.registry.read().await.decode(&message.plaintext)?;

        let connection = self
            .connections
            .find_by_keys(
                message.sender_verkey.to_owned(),
                message.recipient_verkey.to_owned(),
            )
            .await?;

        debug!(
            "agent: received {} on connection {:?}",
            decoded.message_type(),
            connection.as_ref().map(|record| record.get_id())
        );

        let ctx = InboundMessageContext::new(decoded)
            .with_connection(connection)
            .with_keys(message.sender_verkey, message.recipient_verkey);

        self.dispatcher.read().await.dispatch(ctx).await
    }

    /// `shutdown` stops the pickup loop and closes the event bus
    pub async fn shutdown(&self) {
        if let Some(pickup) = self.pickup.lock().await.take() {
            pickup.abort();
        }

        self.deps.events.close();
        info!("agent: {} stopped", self.config.agent().get_label());
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.deps.events
    }

    pub fn connections(&self) -> &ConnectionsModule {
        &self.connections
    }

    pub fn credentials(&self) -> &CredentialsModule {
        &self.credentials
    }

    pub fn proofs(&self) -> &ProofsModule {
        &self.proofs
    }

    pub fn basic_messages(&self) -> &BasicMessagesModule {
        &self.basic_messages
    }

    pub fn mediation(&self) -> &MediationModule {
        &self.mediation
    }

    fn handlers(&self) -> Vec<Arc<dyn MessageHandler>> {
        let options = self.config.agent();
        let auto_accept_credential = options.get_auto_accept_credential();
        let auto_accept_proof = options.get_auto_accept_proof();

        let connections = ConnectionService::new(&self.deps);
        let credentials = CredentialService::new(&self.deps);
        let proofs = ProofService::new(&self.deps);
        let mediation = MediationService::new(&self.deps);

        vec![
            Arc::new(ConnectionRequestHandler::new(
                connections.clone(),
                mediation.clone(),
                options.get_auto_accept_connections(),
                options.get_endpoint(),
            )),
            Arc::new(ConnectionResponseHandler::new(connections.clone())),
            Arc::new(TrustPingHandler::new(connections.clone())),
            Arc::new(TrustPingResponseHandler::new(connections)),
            Arc::new(ProposeCredentialHandler::new(
                credentials.clone(),
                auto_accept_credential,
            )),
            Arc::new(OfferCredentialHandler::new(
                credentials.clone(),
                auto_accept_credential,
            )),
            Arc::new(RequestCredentialHandler::new(
                credentials.clone(),
                auto_accept_credential,
            )),
            Arc::new(IssueCredentialHandler::new(
                credentials.clone(),
                auto_accept_credential,
            )),
            Arc::new(CredentialAckHandler::new(credentials)),
            Arc::new(ProposePresentationHandler::new(
                proofs.clone(),
                auto_accept_proof,
            )),
            Arc::new(RequestPresentationHandler::new(
                proofs.clone(),
                auto_accept_proof,
            )),
            Arc::new(PresentationHandler::new(proofs.clone(), auto_accept_proof)),
            Arc::new(PresentationAckHandler::new(proofs)),
            Arc::new(BasicMessageHandler::new(BasicMessageService::new(
                &self.deps,
            ))),
            Arc::new(MediationGrantHandler::new(mediation.clone())),
            Arc::new(MediationDenyHandler::new(mediation.clone())),
            Arc::new(KeylistUpdateResponseHandler::new(mediation.clone())),
            Arc::new(BatchHandler::new(mediation, self.deps.transport.clone())),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::mpsc::Receiver;

    use rst_common::with_tokio::tokio;

    use prople_aries_core::agent::events::{BasicMessageEvent, EventBusError};
    use prople_aries_core::agent::message::{generate_id, DidCommMessage, ThreadDecorator};
    use prople_aries_core::agent::registry::AgentMessage;
    use prople_aries_core::agent::MessageError;
    use prople_aries_core::basicmessage::{BasicMessage, BasicMessageRole};
    use prople_aries_core::connection::messages::ConnectionInvitationMessage;
    use prople_aries_core::connection::types::ReceiveInvitationOptions;
    use prople_aries_core::connection::{ConnectionRecord, ConnectionState};
    use prople_aries_core::routing::messages::{
        BatchPickupMessage, KeylistUpdateMessage, MediationGrantMessage, MediationRequestMessage,
    };

    use crate::config::AgentOptions;
    use crate::modules::PICKUP_BATCH_SIZE;
    use crate::testutil;

    struct Peer {
        agent: Agent,
        outbox: Receiver<OutboundMessage>,
    }

    impl Peer {
        fn new(label: &str) -> Self {
            let (collaborators, outbox) = testutil::collaborators(label);
            let options = AgentOptions::new(label)
                .with_endpoint(&format!("https://{}.example.com", label))
                .with_auto_accept_connections(true);

            let agent = Agent::new(Config::new().with_agent(options), collaborators).unwrap();
            Self { agent, outbox }
        }

        fn next_outbound(&self) -> OutboundMessage {
            self.outbox.try_recv().unwrap()
        }
    }

    fn recipient_of(connection: &ConnectionRecord) -> Option<String> {
        connection.get_their_key().or_else(|| {
            connection
                .get_invitation()
                .and_then(|invitation| invitation.recipient_keys.first().cloned())
        })
    }

    fn envelope(outbound: &OutboundMessage) -> DecryptedMessage {
        DecryptedMessage {
            plaintext: MessageRegistry::encode(&outbound.payload).unwrap(),
            sender_verkey: Some(outbound.connection.get_verkey()),
            recipient_verkey: recipient_of(&outbound.connection),
        }
    }

    /// `deliver` moves the oldest outbound message of `from` into `to`
    async fn deliver(from: &Peer, to: &Peer) -> Option<OutboundMessage> {
        let outbound = from.next_outbound();
        to.agent.receive_message(envelope(&outbound)).await.unwrap()
    }

    async fn connect(alice: &Peer, faber: &Peer) -> (ConnectionRecord, ConnectionRecord) {
        let (invitation, faber_record) = faber
            .agent
            .connections()
            .create_connection(None, None)
            .await
            .unwrap();

        let alice_record = alice
            .agent
            .connections()
            .receive_invitation(invitation, ReceiveInvitationOptions::default())
            .await
            .unwrap();
        assert_eq!(alice_record.get_state(), ConnectionState::Requested);

        let response = deliver(alice, faber).await;
        assert!(response.is_some());

        let ping = deliver(faber, alice).await;
        assert!(ping.is_some());

        let reply = deliver(alice, faber).await;
        assert!(reply.is_none());

        let alice_record = alice
            .agent
            .connections()
            .get_by_id(&alice_record.get_id())
            .await
            .unwrap();
        let faber_record = faber
            .agent
            .connections()
            .get_by_id(&faber_record.get_id())
            .await
            .unwrap();

        (alice_record, faber_record)
    }

    #[tokio::test]
    async fn test_receive_before_initialize() {
        let peer = Peer::new("alice");
        let message = BasicMessage::new("hello".to_string());
        let inbound = DecryptedMessage {
            plaintext: MessageRegistry::encode(&AgentMessage::from(message)).unwrap(),
            sender_verkey: None,
            recipient_verkey: None,
        };

        let received = peer.agent.receive_message(inbound).await;
        assert!(matches!(
            received.unwrap_err(),
            AgentError::Message(MessageError::UnknownMessageType(_))
        ))
    }

    #[tokio::test]
    async fn test_initialize_twice() {
        let peer = Peer::new("alice");
        assert!(peer.agent.initialize().await.is_ok());
        assert!(peer.agent.initialize().await.is_ok());

        let dispatcher = peer.agent.dispatcher.read().await;
        assert!(dispatcher.has_handler(BasicMessage::MESSAGE_TYPE));
        assert!(dispatcher.has_handler(MediationGrantMessage::MESSAGE_TYPE));
    }

    #[test]
    fn test_invalid_config() {
        let (collaborators, _) = testutil::collaborators("alice");
        let config = Config::new().with_agent(AgentOptions::new(""));

        let agent = Agent::new(config, collaborators);
        assert!(matches!(
            agent.err(),
            Some(CommonError::ValidationError(_))
        ))
    }

    #[tokio::test]
    async fn test_connect_and_message() {
        let alice = Peer::new("alice");
        let faber = Peer::new("faber");
        alice.agent.initialize().await.unwrap();
        faber.agent.initialize().await.unwrap();

        let (alice_record, faber_record) = connect(&alice, &faber).await;
        assert_eq!(alice_record.get_state(), ConnectionState::Complete);
        assert_eq!(faber_record.get_state(), ConnectionState::Complete);
        assert_eq!(alice_record.get_their_did(), Some(faber_record.get_did()));

        let garbage = DecryptedMessage {
            plaintext: "{not json".to_string(),
            sender_verkey: Some(alice_record.get_verkey()),
            recipient_verkey: Some(faber_record.get_verkey()),
        };
        let rejected = faber.agent.receive_message(garbage).await;
        assert!(matches!(
            rejected.unwrap_err(),
            AgentError::Message(MessageError::DecodeError(_))
        ));

        let mut stream = faber.agent.events().listen();
        let sent = alice
            .agent
            .basic_messages()
            .send_message(&alice_record.get_id(), "hello faber")
            .await
            .unwrap();
        assert_eq!(sent.get_role(), BasicMessageRole::Sender);

        assert!(deliver(&alice, &faber).await.is_none());

        let event = stream.next_event::<BasicMessageEvent>().await.unwrap();
        assert_eq!(event.record.get_role(), BasicMessageRole::Receiver);
        assert_eq!(event.record.get_content(), "hello faber".to_string());

        let received = faber
            .agent
            .basic_messages()
            .find_by_connection_id(&faber_record.get_id())
            .await
            .unwrap();
        assert_eq!(received.len(), 1)
    }

    #[tokio::test]
    async fn test_send_blank_message() {
        let alice = Peer::new("alice");

        let missing_connection = alice.agent.basic_messages().send_message("", "hi").await;
        assert!(matches!(
            missing_connection.unwrap_err(),
            AgentError::ValidationError(_)
        ));

        let blank = alice.agent.basic_messages().send_message("conn-1", " ").await;
        assert!(matches!(blank.unwrap_err(), AgentError::ValidationError(_)));
        assert!(alice.outbox.try_recv().is_err())
    }

    #[tokio::test]
    async fn test_mediated_connection() {
        let alice = Peer::new("alice");
        let mediator = Peer::new("mediator");
        alice.agent.initialize().await.unwrap();
        mediator.agent.initialize().await.unwrap();

        let (alice_record, mediator_record) = connect(&alice, &mediator).await;

        let requested = alice
            .agent
            .mediation()
            .request_mediation(&alice_record.get_id())
            .await
            .unwrap();

        let outbound = alice.next_outbound();
        let request: MediationRequestMessage = outbound.payload.try_into().unwrap();
        assert_eq!(requested.get_thread_id(), request.get_id());

        let grant = MediationGrantMessage {
            id: generate_id(),
            thread: Some(ThreadDecorator::new(request.get_id())),
            endpoint: "https://mediator.example.com/relay".to_string(),
            routing_keys: vec!["mediator-routing-key".to_string()],
        };
        let granted = alice
            .agent
            .receive_message(DecryptedMessage {
                plaintext: MessageRegistry::encode(&AgentMessage::from(grant)).unwrap(),
                sender_verkey: Some(mediator_record.get_verkey()),
                recipient_verkey: Some(alice_record.get_verkey()),
            })
            .await;
        assert!(granted.unwrap().is_none());

        let provisioned = alice
            .agent
            .mediation()
            .provision("https://unused.example.com")
            .await
            .unwrap();
        assert_eq!(provisioned.get_id(), requested.get_id());

        let (invitation, record) = alice
            .agent
            .connections()
            .create_connection(None, Some(false))
            .await
            .unwrap();
        assert_eq!(
            invitation.service_endpoint,
            Some("https://mediator.example.com/relay".to_string())
        );
        assert_eq!(
            invitation.routing_keys,
            vec!["mediator-routing-key".to_string()]
        );

        let update: KeylistUpdateMessage = alice.next_outbound().payload.try_into().unwrap();
        assert_eq!(update.updates[0].recipient_key, record.get_verkey());

        assert!(alice.agent.mediation().pickup().await.unwrap());
        let pickup: BatchPickupMessage = alice.next_outbound().payload.try_into().unwrap();
        assert_eq!(pickup.batch_size, PICKUP_BATCH_SIZE);
    }

    #[tokio::test]
    async fn test_invitation_url_roundtrip() {
        let alice = Peer::new("alice");
        let faber = Peer::new("faber");
        alice.agent.initialize().await.unwrap();
        faber.agent.initialize().await.unwrap();

        let (invitation, _) = faber
            .agent
            .connections()
            .create_connection(None, None)
            .await
            .unwrap();
        let url = invitation.to_url("https://faber.example.com").unwrap();

        let record = alice
            .agent
            .connections()
            .receive_invitation_from_url(
                &url,
                ReceiveInvitationOptions {
                    alias: Some("faber".to_string()),
                    auto_accept_connection: Some(false),
                },
            )
            .await
            .unwrap();

        assert_eq!(record.get_state(), ConnectionState::Invited);
        assert_eq!(
            record.get_invitation().map(|inv| inv.id.to_owned()),
            Some(invitation.id)
        );
        assert!(alice.outbox.try_recv().is_err());
        assert!(ConnectionInvitationMessage::from_url("https://faber.example.com").is_err())
    }

    #[tokio::test]
    async fn test_shutdown_closes_events() {
        let peer = Peer::new("alice");
        peer.agent.initialize().await.unwrap();

        let mut stream = peer.agent.events().listen();
        peer.agent.shutdown().await;

        assert!(matches!(stream.recv().await, Err(EventBusError::Closed)));

        let mut late = peer.agent.events().listen();
        assert!(matches!(late.recv().await, Err(EventBusError::Closed)))
    }
}
