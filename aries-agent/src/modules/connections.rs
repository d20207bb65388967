use std::sync::Arc;

use rst_common::with_logging::log::debug;

use prople_aries_core::agent::types::TransportBuilder;
use prople_aries_core::agent::{AgentDependencies, AgentError, OutboundMessage};
use prople_aries_core::connection::messages::ConnectionInvitationMessage;
use prople_aries_core::connection::types::{
    ConnectionRequestOptions, CreateInvitationOptions, ReceiveInvitationOptions, TrustPingOptions,
};
use prople_aries_core::connection::{ConnectionRecord, ConnectionService};
use prople_aries_core::routing::{MediationService, Routing};

use crate::config::AgentOptions;

#[derive(Clone)]
pub struct ConnectionsModule {
    service: ConnectionService,
    mediation: MediationService,
    transport: Arc<dyn TransportBuilder>,
    options: AgentOptions,
}

impl ConnectionsModule {
    pub fn new(deps: &AgentDependencies, options: AgentOptions) -> Self {
        Self {
            service: ConnectionService::new(deps),
            mediation: MediationService::new(deps),
            transport: deps.transport.clone(),
            options,
        }
    }

    /// `create_connection` builds an invitation, routed through the default mediator when one
    /// was granted
    pub async fn create_connection(
        &self,
        alias: Option<String>,
        auto_accept_connection: Option<bool>,
    ) -> Result<(ConnectionInvitationMessage, ConnectionRecord), AgentError> {
        let routing = self.routing().await?;
        let (invitation, record) = self
            .service
            .create_invitation(CreateInvitationOptions {
                label: self.options.get_label(),
                alias,
                image_url: None,
                auto_accept_connection,
                routing: routing.clone(),
            })
            .await?;

        self.update_mediator_keys(&routing, &record).await?;
        Ok((invitation, record))
    }

    /// `receive_invitation` stores the invitation and answers it right away when auto
    /// acceptance applies
    pub async fn receive_invitation(
        &self,
        invitation: ConnectionInvitationMessage,
        options: ReceiveInvitationOptions,
    ) -> Result<ConnectionRecord, AgentError> {
        let record = self.service.receive_invitation(invitation, options).await?;

        let auto_accept = record
            .get_auto_accept_connection()
            .unwrap_or(self.options.get_auto_accept_connections());
        if !auto_accept {
            return Ok(record);
        }

        self.accept_invitation(&record.get_id()).await
    }

    pub async fn receive_invitation_from_url(
        &self,
        url: &str,
        options: ReceiveInvitationOptions,
    ) -> Result<ConnectionRecord, AgentError> {
        let invitation = ConnectionInvitationMessage::from_url(url)?;
        self.receive_invitation(invitation, options).await
    }

    pub async fn accept_invitation(&self, connection_id: &str) -> Result<ConnectionRecord, AgentError> {
        let routing = self.routing().await?;
        let (request, record) = self
            .service
            .create_request(
                connection_id,
                ConnectionRequestOptions {
                    label: self.options.get_label(),
                    image_url: None,
                    routing: routing.clone(),
                },
            )
            .await?;

        self.update_mediator_keys(&routing, &record).await?;
        self.transport
            .send(OutboundMessage::new(request, record.clone()))
            .await?;

        Ok(record)
    }

    pub async fn accept_request(&self, connection_id: &str) -> Result<ConnectionRecord, AgentError> {
        let routing = self.routing().await?;
        let (response, record) = self.service.create_response(connection_id, routing).await?;

        self.transport
            .send(OutboundMessage::new(response, record.clone()))
            .await?;

        Ok(record)
    }

    pub async fn send_trust_ping(
        &self,
        connection_id: &str,
        options: TrustPingOptions,
    ) -> Result<ConnectionRecord, AgentError> {
        let (ping, record) = self
            .service
            .create_trust_ping(connection_id, options)
            .await?;

        self.transport
            .send(OutboundMessage::new(ping, record.clone()))
            .await?;

        Ok(record)
    }

    pub async fn get_all(&self) -> Result<Vec<ConnectionRecord>, AgentError> {
        self.service.get_all().await
    }

    pub async fn find_by_id(&self, connection_id: &str) -> Result<Option<ConnectionRecord>, AgentError> {
        self.service.find_by_id(connection_id).await
    }

    pub async fn get_by_id(&self, connection_id: &str) -> Result<ConnectionRecord, AgentError> {
        self.service.get_by_id(connection_id).await
    }

    pub async fn delete_by_id(&self, connection_id: &str) -> Result<(), AgentError> {
        self.service.delete_by_id(connection_id).await
    }

    pub(crate) async fn find_by_keys(
        &self,
        sender_verkey: Option<String>,
        recipient_verkey: Option<String>,
    ) -> Result<Option<ConnectionRecord>, AgentError> {
        self.service
            .find_by_keys(sender_verkey, recipient_verkey)
            .await
    }

    async fn routing(&self) -> Result<Routing, AgentError> {
        self.mediation.get_routing(self.options.get_endpoint()).await
    }

    /// The mediator must know the new key before the peer starts sending to it
    async fn update_mediator_keys(
        &self,
        routing: &Routing,
        record: &ConnectionRecord,
    ) -> Result<(), AgentError> {
        let mediator_id = match &routing.mediator_id {
            Some(mediator_id) => mediator_id,
            None => return Ok(()),
        };

        debug!(
            "connection: registering {} on mediator {}",
            record.get_verkey(),
            mediator_id
        );

        let (update, mediator_connection) = self
            .mediation
            .create_keylist_update(mediator_id, &record.get_verkey())
            .await?;

        self.transport
            .send(OutboundMessage::new(update, mediator_connection))
            .await
    }
}
