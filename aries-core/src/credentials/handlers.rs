use rst_common::standard::async_trait::async_trait;
use rst_common::with_logging::log::debug;

use crate::agent::context::{InboundMessageContext, OutboundMessage};
use crate::agent::dispatcher::MessageHandler;
use crate::agent::message::DidCommMessage;
use crate::agent::registry::AgentMessage;
use crate::agent::types::AgentError;

use super::messages::{
    CredentialAckMessage, IssueCredentialMessage, OfferCredentialMessage,
    ProposeCredentialMessage, RequestCredentialMessage,
};
use super::record::CredentialExchangeRecord;
use super::service::CredentialService;
use super::types::{
    AcceptProposalOptions, AutoAcceptCredential, CreateCredentialOptions, CreateRequestOptions,
};

fn reply(
    ctx: &InboundMessageContext,
    message: impl Into<AgentMessage>,
) -> Result<Option<OutboundMessage>, AgentError> {
    let connection = ctx.assert_ready_connection()?;
    Ok(Some(OutboundMessage::new(message, connection.clone())))
}

fn policy(record: &CredentialExchangeRecord, agent: AutoAcceptCredential) -> AutoAcceptCredential {
    AutoAcceptCredential::compose(record.get_auto_accept_credential(), agent)
}

pub struct ProposeCredentialHandler {
    service: CredentialService,
    auto_accept: AutoAcceptCredential,
}

impl ProposeCredentialHandler {
    pub fn new(service: CredentialService, auto_accept: AutoAcceptCredential) -> Self {
        Self {
            service,
            auto_accept,
        }
    }

    /// A proposal is content approved when it repeats the offer we sent earlier on the thread
    async fn should_accept(&self, record: &CredentialExchangeRecord) -> Result<bool, AgentError> {
        match policy(record, self.auto_accept) {
            AutoAcceptCredential::Always => Ok(true),
            AutoAcceptCredential::Never => Ok(false),
            AutoAcceptCredential::ContentApproved => {
                let proposal = self.service.find_proposal_message(&record.get_id()).await?;
                let offer = self.service.find_offer_message(&record.get_id()).await?;

                let approved = match (proposal, offer) {
                    (Some(proposal), Some(offer)) => {
                        let same_attributes = proposal
                            .credential_proposal
                            .map(|preview| preview.attributes == offer.credential_preview.attributes)
                            .unwrap_or(false);

                        same_attributes
                            && proposal.cred_def_id == record.get_credential_definition_id()
                    }
                    _ => false,
                };

                Ok(approved)
            }
        }
    }
}

#[async_trait]
impl MessageHandler for ProposeCredentialHandler {
    fn message_type(&self) -> &'static str {
        ProposeCredentialMessage::MESSAGE_TYPE
    }

    async fn handle(
        &self,
        ctx: InboundMessageContext,
    ) -> Result<Option<OutboundMessage>, AgentError> {
        let record = self.service.process_proposal(&ctx).await?;
        if !self.should_accept(&record).await? {
            debug!("credential: proposal {} waits for acceptance", record.get_id());
            return Ok(None);
        }

        let (offer, _) = self
            .service
            .accept_proposal(&record.get_id(), AcceptProposalOptions::default())
            .await?;

        reply(&ctx, offer)
    }
}

pub struct OfferCredentialHandler {
    service: CredentialService,
    auto_accept: AutoAcceptCredential,
}

impl OfferCredentialHandler {
    pub fn new(service: CredentialService, auto_accept: AutoAcceptCredential) -> Self {
        Self {
            service,
            auto_accept,
        }
    }

    /// An offer is content approved when it matches the proposal we sent on the thread
    async fn should_accept(&self, record: &CredentialExchangeRecord) -> Result<bool, AgentError> {
        match policy(record, self.auto_accept) {
            AutoAcceptCredential::Always => Ok(true),
            AutoAcceptCredential::Never => Ok(false),
            AutoAcceptCredential::ContentApproved => {
                let proposal = self.service.find_proposal_message(&record.get_id()).await?;

                let approved = match proposal {
                    Some(proposal) => {
                        let same_attributes = proposal
                            .credential_proposal
                            .map(|preview| {
                                Some(preview.attributes) == record.get_credential_attributes()
                            })
                            .unwrap_or(false);

                        same_attributes
                            && proposal.cred_def_id == record.get_credential_definition_id()
                    }
                    None => false,
                };

                Ok(approved)
            }
        }
    }
}

#[async_trait]
impl MessageHandler for OfferCredentialHandler {
    fn message_type(&self) -> &'static str {
        OfferCredentialMessage::MESSAGE_TYPE
    }

    async fn handle(
        &self,
        ctx: InboundMessageContext,
    ) -> Result<Option<OutboundMessage>, AgentError> {
        let record = self.service.process_offer(&ctx).await?;
        if !self.should_accept(&record).await? {
            debug!("credential: offer {} waits for acceptance", record.get_id());
            return Ok(None);
        }

        let (request, _) = self
            .service
            .create_request(&record.get_id(), CreateRequestOptions::default())
            .await?;

        reply(&ctx, request)
    }
}

pub struct RequestCredentialHandler {
    service: CredentialService,
    auto_accept: AutoAcceptCredential,
}

impl RequestCredentialHandler {
    pub fn new(service: CredentialService, auto_accept: AutoAcceptCredential) -> Self {
        Self {
            service,
            auto_accept,
        }
    }
}

#[async_trait]
impl MessageHandler for RequestCredentialHandler {
    fn message_type(&self) -> &'static str {
        RequestCredentialMessage::MESSAGE_TYPE
    }

    async fn handle(
        &self,
        ctx: InboundMessageContext,
    ) -> Result<Option<OutboundMessage>, AgentError> {
        let record = self.service.process_request(&ctx).await?;
        if policy(&record, self.auto_accept) == AutoAcceptCredential::Never {
            debug!("credential: request {} waits for acceptance", record.get_id());
            return Ok(None);
        }

        let (credential, _) = self
            .service
            .create_credential(&record.get_id(), CreateCredentialOptions::default())
            .await?;

        reply(&ctx, credential)
    }
}

pub struct IssueCredentialHandler {
    service: CredentialService,
    auto_accept: AutoAcceptCredential,
}

impl IssueCredentialHandler {
    pub fn new(service: CredentialService, auto_accept: AutoAcceptCredential) -> Self {
        Self {
            service,
            auto_accept,
        }
    }
}

#[async_trait]
impl MessageHandler for IssueCredentialHandler {
    fn message_type(&self) -> &'static str {
        IssueCredentialMessage::MESSAGE_TYPE
    }

    async fn handle(
        &self,
        ctx: InboundMessageContext,
    ) -> Result<Option<OutboundMessage>, AgentError> {
        let record = self.service.process_credential(&ctx).await?;
        if policy(&record, self.auto_accept) == AutoAcceptCredential::Never {
            return Ok(None);
        }

        let (ack, _) = self.service.create_ack(&record.get_id()).await?;
        reply(&ctx, ack)
    }
}

pub struct CredentialAckHandler {
    service: CredentialService,
}

impl CredentialAckHandler {
    pub fn new(service: CredentialService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl MessageHandler for CredentialAckHandler {
    fn message_type(&self) -> &'static str {
        CredentialAckMessage::MESSAGE_TYPE
    }

    async fn handle(
        &self,
        ctx: InboundMessageContext,
    ) -> Result<Option<OutboundMessage>, AgentError> {
        self.service.process_ack(&ctx).await?;
        Ok(None)
    }
}
