use std::collections::BTreeSet;

use rst_common::standard::async_trait::async_trait;
use rst_common::with_logging::log::debug;

use crate::agent::context::{InboundMessageContext, OutboundMessage};
use crate::agent::dispatcher::MessageHandler;
use crate::agent::message::DidCommMessage;
use crate::agent::registry::AgentMessage;
use crate::agent::types::AgentError;

use super::messages::{
    PresentationAckMessage, PresentationMessage, ProposePresentationMessage,
    RequestPresentationMessage,
};
use super::record::ProofExchangeRecord;
use super::service::ProofService;
use super::types::{
    AcceptProofProposalOptions, AutoAcceptProof, CreatePresentationOptions, PresentationPreview,
    ProofRequest,
};

fn reply(
    ctx: &InboundMessageContext,
    message: impl Into<AgentMessage>,
) -> Result<Option<OutboundMessage>, AgentError> {
    let connection = ctx.assert_ready_connection()?;
    Ok(Some(OutboundMessage::new(message, connection.clone())))
}

fn policy(record: &ProofExchangeRecord, agent: AutoAcceptProof) -> AutoAcceptProof {
    AutoAcceptProof::compose(record.get_auto_accept_proof(), agent)
}

/// A preview matches a proof request when every attribute it names is requested
fn preview_matches(preview: &PresentationPreview, request: &ProofRequest) -> bool {
    let requested: BTreeSet<String> = request
        .requested_attributes
        .values()
        .filter_map(|info| info.name.to_owned())
        .chain(
            request
                .requested_predicates
                .values()
                .map(|info| info.name.to_owned()),
        )
        .collect();

    preview
        .attributes
        .iter()
        .map(|attr| &attr.name)
        .chain(preview.predicates.iter().map(|pred| &pred.name))
        .all(|name| requested.contains(name))
}

pub struct ProposePresentationHandler {
    service: ProofService,
    auto_accept: AutoAcceptProof,
}

impl ProposePresentationHandler {
    pub fn new(service: ProofService, auto_accept: AutoAcceptProof) -> Self {
        Self {
            service,
            auto_accept,
        }
    }

    async fn should_accept(&self, record: &ProofExchangeRecord) -> Result<bool, AgentError> {
        match policy(record, self.auto_accept) {
            AutoAcceptProof::Always => Ok(true),
            AutoAcceptProof::Never => Ok(false),
            AutoAcceptProof::ContentApproved => {
                let proposal = self.service.find_proposal_message(&record.get_id()).await?;

                let approved = match (proposal, record.get_proof_request()) {
                    (Some(proposal), Some(request)) => {
                        preview_matches(&proposal.presentation_proposal, request)
                    }
                    _ => false,
                };

                Ok(approved)
            }
        }
    }
}

#[async_trait]
impl MessageHandler for ProposePresentationHandler {
    fn message_type(&self) -> &'static str {
        ProposePresentationMessage::MESSAGE_TYPE
    }

    async fn handle(
        &self,
        ctx: InboundMessageContext,
    ) -> Result<Option<OutboundMessage>, AgentError> {
        let record = self.service.process_proposal(&ctx).await?;
        if !self.should_accept(&record).await? {
            debug!("proof: proposal {} waits for acceptance", record.get_id());
            return Ok(None);
        }

        let (request, _) = self
            .service
            .accept_proposal(&record.get_id(), AcceptProofProposalOptions::default())
            .await?;

        reply(&ctx, request)
    }
}

pub struct RequestPresentationHandler {
    service: ProofService,
    auto_accept: AutoAcceptProof,
}

impl RequestPresentationHandler {
    pub fn new(service: ProofService, auto_accept: AutoAcceptProof) -> Self {
        Self {
            service,
            auto_accept,
        }
    }

    /// A request is content approved when it asks for what we proposed on the thread
    async fn should_accept(&self, record: &ProofExchangeRecord) -> Result<bool, AgentError> {
        match policy(record, self.auto_accept) {
            AutoAcceptProof::Always => Ok(true),
            AutoAcceptProof::Never => Ok(false),
            AutoAcceptProof::ContentApproved => {
                let proposal = self.service.find_proposal_message(&record.get_id()).await?;

                let approved = match (proposal, record.get_proof_request()) {
                    (Some(proposal), Some(request)) => {
                        preview_matches(&proposal.presentation_proposal, request)
                    }
                    _ => false,
                };

                Ok(approved)
            }
        }
    }
}

#[async_trait]
impl MessageHandler for RequestPresentationHandler {
    fn message_type(&self) -> &'static str {
        RequestPresentationMessage::MESSAGE_TYPE
    }

    async fn handle(
        &self,
        ctx: InboundMessageContext,
    ) -> Result<Option<OutboundMessage>, AgentError> {
        let record = self.service.process_request(&ctx).await?;
        if !self.should_accept(&record).await? {
            debug!("proof: request {} waits for acceptance", record.get_id());
            return Ok(None);
        }

        let requested_credentials = self
            .service
            .auto_select_credentials(&record.get_id())
            .await?;

        let (presentation, _) = self
            .service
            .create_presentation(
                &record.get_id(),
                CreatePresentationOptions {
                    requested_credentials,
                    comment: None,
                },
            )
            .await?;

        reply(&ctx, presentation)
    }
}

/// `PresentationHandler` acknowledges verified presentations unless the policy is `Never`
pub struct PresentationHandler {
    service: ProofService,
    auto_accept: AutoAcceptProof,
}

impl PresentationHandler {
    pub fn new(service: ProofService, auto_accept: AutoAcceptProof) -> Self {
        Self {
            service,
            auto_accept,
        }
    }
}

#[async_trait]
impl MessageHandler for PresentationHandler {
    fn message_type(&self) -> &'static str {
        PresentationMessage::MESSAGE_TYPE
    }

    async fn handle(
        &self,
        ctx: InboundMessageContext,
    ) -> Result<Option<OutboundMessage>, AgentError> {
        let record = self.service.process_presentation(&ctx).await?;

        let accept = match policy(&record, self.auto_accept) {
            AutoAcceptProof::Always => true,
            AutoAcceptProof::ContentApproved => record.get_is_verified() == Some(true),
            AutoAcceptProof::Never => false,
        };

        if !accept {
            return Ok(None);
        }

        let (ack, _) = self.service.create_ack(&record.get_id()).await?;
        reply(&ctx, ack)
    }
}

pub struct PresentationAckHandler {
    service: ProofService,
}

impl PresentationAckHandler {
    pub fn new(service: ProofService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl MessageHandler for PresentationAckHandler {
    fn message_type(&self) -> &'static str {
        PresentationAckMessage::MESSAGE_TYPE
    }

    async fn handle(
        &self,
        ctx: InboundMessageContext,
    ) -> Result<Option<OutboundMessage>, AgentError> {
        self.service.process_ack(&ctx).await?;
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::proofs::types::{
        PresentationPreviewAttribute, PresentationPreviewPredicate, ProofAttributeInfo,
        ProofPredicateInfo,
    };

    fn preview() -> PresentationPreview {
        PresentationPreview::new(
            vec![PresentationPreviewAttribute {
                name: "name".to_string(),
                cred_def_id: None,
                mime_type: None,
                value: None,
                referent: None,
            }],
            vec![PresentationPreviewPredicate {
                name: "age".to_string(),
                cred_def_id: "def-1".to_string(),
                predicate: ">=".to_string(),
                threshold: 18,
            }],
        )
    }

    #[test]
    fn test_preview_matches_request() {
        let request = ProofRequest::new("kyc", "1.0")
            .with_attribute(
                "0_name",
                ProofAttributeInfo {
                    name: Some("name".to_string()),
                    ..Default::default()
                },
            )
            .with_predicate(
                "0_age",
                ProofPredicateInfo {
                    name: "age".to_string(),
                    p_type: ">=".to_string(),
                    p_value: 21,
                    restrictions: None,
                },
            );

        assert!(preview_matches(&preview(), &request))
    }

    #[test]
    fn test_preview_not_covered() {
        let request = ProofRequest::new("kyc", "1.0").with_attribute(
            "0_name",
            ProofAttributeInfo {
                name: Some("name".to_string()),
                ..Default::default()
            },
        );

        assert!(!preview_matches(&preview(), &request))
    }
}
