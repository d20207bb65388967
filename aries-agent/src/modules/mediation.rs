use std::sync::Arc;
use std::time::Duration;

use rst_common::with_logging::log::{debug, info, warn};
use rst_common::with_tokio::tokio::{self, task::JoinHandle};

use prople_aries_core::agent::events::{
    ConnectionEvent, EventBusError, EventKind, EventStream, MediationEvent,
};
use prople_aries_core::agent::types::TransportBuilder;
use prople_aries_core::agent::{AgentDependencies, AgentError, EventBus, OutboundMessage};
use prople_aries_core::connection::messages::ConnectionInvitationMessage;
use prople_aries_core::connection::types::ReceiveInvitationOptions;
use prople_aries_core::connection::ConnectionRecord;
use prople_aries_core::routing::{MediationRecord, MediationService, MediationState, PickupStrategy};

use crate::config::MediatorOptions;

use super::ConnectionsModule;

pub const PICKUP_BATCH_SIZE: usize = 10;
const PROVISION_TIMEOUT: Duration = Duration::from_secs(30);
const MEDIATOR_ALIAS: &str = "mediator";

#[derive(Clone)]
pub struct MediationModule {
    service: MediationService,
    connections: ConnectionsModule,
    events: EventBus,
    transport: Arc<dyn TransportBuilder>,
    options: MediatorOptions,
}

impl MediationModule {
    pub fn new(
        deps: &AgentDependencies,
        connections: ConnectionsModule,
        options: MediatorOptions,
    ) -> Self {
        Self {
            service: MediationService::new(deps),
            connections,
            events: deps.events.clone(),
            transport: deps.transport.clone(),
            options,
        }
    }

    /// `provision` connects to the mediator behind `invitation_url` and requests mediation,
    /// waiting for both steps to finish
    ///
    /// A granted default mediator is returned as is. The inbound messages of the handshake must
    /// keep flowing through `Agent::receive_message` while this waits.
    pub async fn provision(&self, invitation_url: &str) -> Result<MediationRecord, AgentError> {
        if let Some(mediator) = self.service.get_default_mediator().await? {
            debug!("mediation: reusing mediator {}", mediator.get_id());
            return Ok(mediator);
        }

        let invitation = ConnectionInvitationMessage::from_url(invitation_url)?;

        let mut stream = self.events.listen();
        let record = self
            .connections
            .receive_invitation(
                invitation,
                ReceiveInvitationOptions {
                    alias: Some(MEDIATOR_ALIAS.to_string()),
                    auto_accept_connection: Some(true),
                },
            )
            .await?;

        let connection_id = record.get_id();
        let connection = wait_for::<ConnectionEvent, _>(&mut stream, |event| {
            event.record.get_id() == connection_id && event.record.is_ready()
        })
        .await?
        .record;

        let requested = self.request(&connection).await?;
        let mediation = wait_for::<MediationEvent, _>(&mut stream, |event| {
            event.record.get_id() == requested.get_id()
                && event.record.get_state() != MediationState::Requested
        })
        .await?
        .record;

        info!(
            "mediation: mediator {} answered {}",
            connection.get_id(),
            mediation.get_state()
        );
        Ok(mediation)
    }

    /// `request_mediation` asks an established connection to mediate for us
    pub async fn request_mediation(&self, connection_id: &str) -> Result<MediationRecord, AgentError> {
        let connection = self.connections.get_by_id(connection_id).await?;
        self.request(&connection).await
    }

    /// `pickup` asks the default mediator for queued messages, it is a no-op without one
    pub async fn pickup(&self) -> Result<bool, AgentError> {
        let mediator = match self.service.get_default_mediator().await? {
            Some(mediator) => mediator,
            None => return Ok(false),
        };

        let (message, connection) = self
            .service
            .create_batch_pickup(&mediator.get_id(), PICKUP_BATCH_SIZE)
            .await?;

        self.transport
            .send(OutboundMessage::new(message, connection))
            .await?;
        Ok(true)
    }

    /// `start_pickup` spawns the polling loop of the `pickup_v1` strategy
    pub fn start_pickup(&self) -> Option<JoinHandle<()>> {
        match self.options.get_pickup_strategy() {
            PickupStrategy::PickupV1 => {}
            PickupStrategy::Implicit => {
                debug!("mediation: implicit pickup relies on the transport return route");
                return None;
            }
            PickupStrategy::None => return None,
        }

        let module = self.clone();
        let period = Duration::from_secs(self.options.get_pickup_interval_secs());

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if let Err(err) = module.pickup().await {
                    warn!("mediation: pickup failed: {}", err);
                }
            }
        }))
    }

    pub async fn get_default_mediator(&self) -> Result<Option<MediationRecord>, AgentError> {
        self.service.get_default_mediator().await
    }

    pub async fn find_by_connection_id(
        &self,
        connection_id: &str,
    ) -> Result<Option<MediationRecord>, AgentError> {
        self.service.find_by_connection_id(connection_id).await
    }

    async fn request(&self, connection: &ConnectionRecord) -> Result<MediationRecord, AgentError> {
        let (message, record) = self.service.create_request(connection).await?;
        self.transport
            .send(OutboundMessage::new(message, connection.clone()))
            .await?;

        Ok(record)
    }
}

async fn wait_for<T, F>(stream: &mut EventStream, matches: F) -> Result<T, AgentError>
where
    T: EventKind,
    F: Fn(&T) -> bool,
{
    let waiting = async {
        loop {
            match stream.next_event::<T>().await {
                Ok(event) if matches(&event) => return Ok(event),
                Ok(_) => continue,
                Err(EventBusError::Lagged(skipped)) => {
                    warn!("mediation: {} events skipped while waiting", skipped);
                    continue;
                }
                Err(err) => return Err(AgentError::ExternalError(err.to_string())),
            }
        }
    };

    tokio::time::timeout(PROVISION_TIMEOUT, waiting)
        .await
        .map_err(|_| AgentError::TransportError("mediation: no answer from mediator".to_string()))?
}
