use std::collections::BTreeMap;
use std::sync::Arc;

use rst_common::standard::serde::de::DeserializeOwned;
use rst_common::standard::serde::Serialize;
use rst_common::standard::serde_json::{self, Map, Value};
use rst_common::with_logging::log::{debug, info};
use rst_common::with_tokio::tokio::sync::OwnedMutexGuard;

use crate::agent::context::InboundMessageContext;
use crate::agent::dependencies::AgentDependencies;
use crate::agent::events::{EventBus, ProofEvent};
use crate::agent::lock::{ExchangeKey, ExchangeLocks};
use crate::agent::message::{generate_id, AckStatus, Attachment, DidCommMessage, ThreadDecorator};
use crate::agent::state::ExchangeState;
use crate::agent::types::{AgentError, LedgerBuilder, MessageError, WalletBuilder};
use crate::connection::ConnectionRecord;
use crate::storage::types::TagQuery;
use crate::storage::{DidCommMessageRepository, DidCommMessageRole, Repository};

use super::messages::{
    PresentationAckMessage, PresentationMessage, ProposePresentationMessage,
    RequestPresentationMessage, INDY_PROOF_ATTACHMENT_ID, INDY_PROOF_REQUEST_ATTACHMENT_ID,
};
use super::record::ProofExchangeRecord;
use super::types::{
    AcceptProofProposalOptions, CreatePresentationOptions, CreateProofProposalOptions,
    CreateProofRequestOptions, CredentialInfo, CredentialsForProofRequest, IndyProof,
    ProofRequest, ProofState, RequestedAttribute, RequestedCredentials, RequestedPredicate,
    PROTOCOL_NAME, PROTOCOL_VERSION_V1,
};

fn parse_json<T: DeserializeOwned>(json: &str) -> Result<T, AgentError> {
    serde_json::from_str::<T>(json)
        .map_err(|err| AgentError::Message(MessageError::DecodeError(err.to_string())))
}

fn to_json<T: Serialize>(value: &T) -> Result<String, AgentError> {
    serde_json::to_string(value)
        .map_err(|err| AgentError::Message(MessageError::EncodeError(err.to_string())))
}

/// `ProofService` runs the present proof exchange for provers and verifiers
#[derive(Clone)]
pub struct ProofService {
    repo: Repository<ProofExchangeRecord>,
    messages: DidCommMessageRepository,
    wallet: Arc<dyn WalletBuilder>,
    ledger: Arc<dyn LedgerBuilder>,
    events: EventBus,
    locks: ExchangeLocks,
}

impl ProofService {
    pub fn new(deps: &AgentDependencies) -> Self {
        Self {
            repo: deps.repository(),
            messages: deps.message_repository(),
            wallet: deps.wallet.clone(),
            ledger: deps.ledger.clone(),
            events: deps.events.clone(),
            locks: deps.locks.clone(),
        }
    }

    pub async fn create_proposal(
        &self,
        connection: &ConnectionRecord,
        options: CreateProofProposalOptions,
    ) -> Result<(ProposePresentationMessage, ProofExchangeRecord), AgentError> {
        Self::assert_connection_ready(connection)?;

        let message = ProposePresentationMessage {
            id: generate_id(),
            thread: None,
            comment: options.comment,
            presentation_proposal: options.presentation_proposal,
        };

        let mut record = ProofExchangeRecord::new(
            connection.get_id(),
            message.get_thread_id(),
            ProofState::ProposalSent,
        );
        record.auto_accept_proof = options.auto_accept_proof;

        self.repo.save(&record).await?;
        self.messages
            .save_agent_message(DidCommMessageRole::Sender, &message, &record.id)
            .await?;
        self.publish(&record);

        Ok((message, record))
    }

    pub async fn process_proposal(
        &self,
        ctx: &InboundMessageContext,
    ) -> Result<ProofExchangeRecord, AgentError> {
        let message: ProposePresentationMessage = ctx.message.clone().try_into()?;
        let connection = ctx.assert_ready_connection()?;
        let thread_id = message.get_thread_id();

        let _guard = self.lock_exchange(&thread_id, &connection.get_id()).await;
        let existing = self
            .find_by_thread_and_connection_id(&thread_id, Some(connection.get_id()))
            .await?;

        match existing {
            Some(mut record) => {
                record.assert_protocol_version(PROTOCOL_VERSION_V1)?;
                record.assert_state(&[ProofState::RequestSent])?;

                self.messages
                    .save_agent_message(DidCommMessageRole::Receiver, &message, &record.id)
                    .await?;
                self.update_state(&mut record, ProofState::ProposalReceived)
                    .await?;
                Ok(record)
            }
            None => {
                let record = ProofExchangeRecord::new(
                    connection.get_id(),
                    thread_id,
                    ProofState::ProposalReceived,
                );

                self.repo.save(&record).await?;
                self.messages
                    .save_agent_message(DidCommMessageRole::Receiver, &message, &record.id)
                    .await?;
                self.publish(&record);
                Ok(record)
            }
        }
    }

    /// `accept_proposal` answers a presentation proposal with a proof request built from its
    /// preview
    pub async fn accept_proposal(
        &self,
        record_id: &str,
        options: AcceptProofProposalOptions,
    ) -> Result<(RequestPresentationMessage, ProofExchangeRecord), AgentError> {
        let (_guard, mut record) = self.lock_record(record_id).await?;
        record.assert_protocol_version(PROTOCOL_VERSION_V1)?;
        record.assert_state(&[ProofState::ProposalReceived])?;

        let proposal = self
            .messages
            .get_agent_message::<ProposePresentationMessage>(&record.id)
            .await?;
        let proof_request = proposal
            .presentation_proposal
            .to_proof_request(&options.name, &options.version);

        let message = Self::build_request(
            Some(ThreadDecorator::new(record.thread_id.to_owned())),
            &proof_request,
            options.comment,
        )?;

        record.proof_request = Some(proof_request);
        if options.auto_accept_proof.is_some() {
            record.auto_accept_proof = options.auto_accept_proof;
        }

        self.messages
            .save_agent_message(DidCommMessageRole::Sender, &message, &record.id)
            .await?;
        self.update_state(&mut record, ProofState::RequestSent)
            .await?;

        Ok((message, record))
    }

    pub async fn create_request(
        &self,
        options: CreateProofRequestOptions,
    ) -> Result<(RequestPresentationMessage, ProofExchangeRecord), AgentError> {
        Self::assert_connection_ready(&options.connection)?;

        if options.proof_request.requested_attributes.is_empty()
            && options.proof_request.requested_predicates.is_empty()
        {
            return Err(AgentError::ValidationError(
                "proof request has no requested attributes or predicates".to_string(),
            ));
        }

        let message = Self::build_request(None, &options.proof_request, options.comment)?;

        let mut record = ProofExchangeRecord::new(
            options.connection.get_id(),
            message.get_thread_id(),
            ProofState::RequestSent,
        );
        record.proof_request = Some(options.proof_request);
        record.auto_accept_proof = options.auto_accept_proof;

        self.repo.save(&record).await?;
        self.messages
            .save_agent_message(DidCommMessageRole::Sender, &message, &record.id)
            .await?;
        self.publish(&record);

        info!("proof: request created on thread {}", record.thread_id);
        Ok((message, record))
    }

    pub async fn process_request(
        &self,
        ctx: &InboundMessageContext,
    ) -> Result<ProofExchangeRecord, AgentError> {
        let message: RequestPresentationMessage = ctx.message.clone().try_into()?;
        let connection = ctx.assert_ready_connection()?;
        let proof_request = message.get_proof_request()?;
        let thread_id = message.get_thread_id();

        let _guard = self.lock_exchange(&thread_id, &connection.get_id()).await;
        let existing = self
            .find_by_thread_and_connection_id(&thread_id, Some(connection.get_id()))
            .await?;

        match existing {
            Some(mut record) => {
                record.assert_protocol_version(PROTOCOL_VERSION_V1)?;
                record.assert_state(&[ProofState::ProposalSent])?;
                record.proof_request = Some(proof_request);

                self.messages
                    .save_agent_message(DidCommMessageRole::Receiver, &message, &record.id)
                    .await?;
                self.update_state(&mut record, ProofState::RequestReceived)
                    .await?;
                Ok(record)
            }
            None => {
                let mut record = ProofExchangeRecord::new(
                    connection.get_id(),
                    thread_id,
                    ProofState::RequestReceived,
                );
                record.proof_request = Some(proof_request);

                self.repo.save(&record).await?;
                self.messages
                    .save_agent_message(DidCommMessageRole::Receiver, &message, &record.id)
                    .await?;
                self.publish(&record);
                Ok(record)
            }
        }
    }

    /// `auto_select_credentials` picks the first wallet credential able to satisfy each
    /// referent of the received proof request
    pub async fn auto_select_credentials(
        &self,
        record_id: &str,
    ) -> Result<RequestedCredentials, AgentError> {
        let record = self.repo.get_by_id(record_id).await?;
        let proof_request = Self::require_proof_request(&record)?;

        let candidates_json = self
            .wallet
            .get_credentials_for_proof_request(to_json(proof_request)?)
            .await
            .map_err(|err| {
                AgentError::collaborator("get_credentials_for_proof_request", &record.id, err)
            })?;
        let candidates: CredentialsForProofRequest = parse_json(&candidates_json)?;

        let mut requested = RequestedCredentials::default();
        for referent in proof_request.requested_attributes.keys() {
            let candidate = candidates
                .attrs
                .get(referent)
                .and_then(|found| found.first())
                .ok_or_else(|| {
                    AgentError::ValidationError(format!(
                        "no credential satisfies attribute {}",
                        referent
                    ))
                })?;

            requested.requested_attributes.insert(
                referent.to_owned(),
                RequestedAttribute {
                    cred_id: candidate.cred_info.referent.to_owned(),
                    revealed: true,
                    timestamp: None,
                },
            );
        }

        for referent in proof_request.requested_predicates.keys() {
            let candidate = candidates
                .predicates
                .get(referent)
                .and_then(|found| found.first())
                .ok_or_else(|| {
                    AgentError::ValidationError(format!(
                        "no credential satisfies predicate {}",
                        referent
                    ))
                })?;

            requested.requested_predicates.insert(
                referent.to_owned(),
                RequestedPredicate {
                    cred_id: candidate.cred_info.referent.to_owned(),
                    timestamp: None,
                },
            );
        }

        Ok(requested)
    }

    pub async fn create_presentation(
        &self,
        record_id: &str,
        options: CreatePresentationOptions,
    ) -> Result<(PresentationMessage, ProofExchangeRecord), AgentError> {
        let (_guard, mut record) = self.lock_record(record_id).await?;
        record.assert_protocol_version(PROTOCOL_VERSION_V1)?;
        record.assert_state(&[ProofState::RequestReceived])?;

        let proof_request = Self::require_proof_request(&record)?.clone();

        let mut schemas = Map::new();
        let mut cred_defs = Map::new();
        for credential_id in options.requested_credentials.credential_ids() {
            let info_json = self
                .wallet
                .get_credential(credential_id)
                .await
                .map_err(|err| AgentError::collaborator("get_credential", &record.id, err))?;
            let info: CredentialInfo = parse_json(&info_json)?;

            self.collect_ledger_objects(
                &record.id,
                &info.schema_id,
                &info.cred_def_id,
                &mut schemas,
                &mut cred_defs,
            )
            .await?;
        }

        let proof_json = self
            .wallet
            .create_proof(
                to_json(&proof_request)?,
                to_json(&options.requested_credentials)?,
                self.wallet.master_secret_id(),
                Value::Object(schemas).to_string(),
                Value::Object(cred_defs).to_string(),
            )
            .await
            .map_err(|err| AgentError::collaborator("create_proof", &record.id, err))?;

        let message = PresentationMessage {
            id: generate_id(),
            thread: Some(ThreadDecorator::new(record.thread_id.to_owned())),
            comment: options.comment,
            presentation_attachments: vec![Attachment::from_data(
                INDY_PROOF_ATTACHMENT_ID,
                proof_json.as_bytes(),
            )],
        };

        self.messages
            .save_agent_message(DidCommMessageRole::Sender, &message, &record.id)
            .await?;
        self.update_state(&mut record, ProofState::PresentationSent)
            .await?;

        Ok((message, record))
    }

    /// `process_presentation` verifies the received proof and keeps the disclosed values
    ///
    /// A proof failing verification still moves the exchange forward, `is_verified` records
    /// the outcome.
    pub async fn process_presentation(
        &self,
        ctx: &InboundMessageContext,
    ) -> Result<ProofExchangeRecord, AgentError> {
        let message: PresentationMessage = ctx.message.clone().try_into()?;
        let connection = ctx.assert_ready_connection()?;
        let proof_json = message.get_proof_json()?;
        let proof: IndyProof = parse_json(&proof_json)?;
        let thread_id = message.get_thread_id();

        let _guard = self.lock_exchange(&thread_id, &connection.get_id()).await;
        let mut record = self
            .get_by_thread_and_connection_id(&thread_id, Some(connection.get_id()))
            .await?;

        record.assert_protocol_version(PROTOCOL_VERSION_V1)?;
        record.assert_state(&[ProofState::RequestSent])?;

        let proof_request = Self::require_proof_request(&record)?.clone();

        let mut schemas = Map::new();
        let mut cred_defs = Map::new();
        for identifier in proof.identifiers.iter() {
            self.collect_ledger_objects(
                &record.id,
                &identifier.schema_id,
                &identifier.cred_def_id,
                &mut schemas,
                &mut cred_defs,
            )
            .await?;
        }

        let verified = self
            .wallet
            .verify_proof(
                to_json(&proof_request)?,
                proof_json,
                Value::Object(schemas).to_string(),
                Value::Object(cred_defs).to_string(),
            )
            .await
            .map_err(|err| AgentError::collaborator("verify_proof", &record.id, err))?;

        let revealed: BTreeMap<String, String> = proof
            .requested_proof
            .revealed_attrs
            .iter()
            .map(|(referent, attr)| {
                let name = proof_request
                    .requested_attributes
                    .get(referent)
                    .and_then(|info| info.name.to_owned())
                    .unwrap_or_else(|| referent.to_owned());
                (name, attr.raw.to_owned())
            })
            .collect();

        debug!(
            "proof: presentation on {} verified: {}",
            record.thread_id, verified
        );

        record.is_verified = Some(verified);
        record.revealed_attributes = revealed;

        self.messages
            .save_agent_message(DidCommMessageRole::Receiver, &message, &record.id)
            .await?;
        self.update_state(&mut record, ProofState::PresentationReceived)
            .await?;

        Ok(record)
    }

    pub async fn create_ack(
        &self,
        record_id: &str,
    ) -> Result<(PresentationAckMessage, ProofExchangeRecord), AgentError> {
        let (_guard, mut record) = self.lock_record(record_id).await?;
        record.assert_protocol_version(PROTOCOL_VERSION_V1)?;
        record.assert_state(&[ProofState::PresentationReceived])?;

        let status = match record.is_verified {
            Some(true) => AckStatus::Ok,
            _ => AckStatus::Fail,
        };

        let message = PresentationAckMessage {
            id: generate_id(),
            thread: Some(ThreadDecorator::new(record.thread_id.to_owned())),
            status,
        };

        self.update_state(&mut record, ProofState::Done).await?;
        Ok((message, record))
    }

    pub async fn process_ack(
        &self,
        ctx: &InboundMessageContext,
    ) -> Result<ProofExchangeRecord, AgentError> {
        let message: PresentationAckMessage = ctx.message.clone().try_into()?;
        let connection = ctx.assert_ready_connection()?;
        let thread_id = message.get_thread_id();

        let _guard = self.lock_exchange(&thread_id, &connection.get_id()).await;
        let mut record = self
            .get_by_thread_and_connection_id(&thread_id, Some(connection.get_id()))
            .await?;

        record.assert_protocol_version(PROTOCOL_VERSION_V1)?;
        record.assert_state(&[ProofState::PresentationSent])?;

        self.update_state(&mut record, ProofState::Done).await?;
        Ok(record)
    }

    pub async fn abandon(
        &self,
        record_id: &str,
        reason: &str,
    ) -> Result<ProofExchangeRecord, AgentError> {
        let (_guard, mut record) = self.lock_record(record_id).await?;
        record.error_message = Some(reason.to_string());

        self.update_state(&mut record, ProofState::Abandoned)
            .await?;
        Ok(record)
    }

    pub async fn find_proposal_message(
        &self,
        record_id: &str,
    ) -> Result<Option<ProposePresentationMessage>, AgentError> {
        self.messages
            .find_agent_message::<ProposePresentationMessage>(record_id)
            .await
            .map_err(AgentError::from)
    }

    pub async fn find_request_message(
        &self,
        record_id: &str,
    ) -> Result<Option<RequestPresentationMessage>, AgentError> {
        self.messages
            .find_agent_message::<RequestPresentationMessage>(record_id)
            .await
            .map_err(AgentError::from)
    }

    pub async fn find_by_id(
        &self,
        record_id: &str,
    ) -> Result<Option<ProofExchangeRecord>, AgentError> {
        self.repo.find_by_id(record_id).await.map_err(AgentError::from)
    }

    pub async fn get_by_id(&self, record_id: &str) -> Result<ProofExchangeRecord, AgentError> {
        self.repo.get_by_id(record_id).await.map_err(AgentError::from)
    }

    pub async fn get_all(&self) -> Result<Vec<ProofExchangeRecord>, AgentError> {
        self.repo.get_all().await.map_err(AgentError::from)
    }

    pub async fn delete_by_id(&self, record_id: &str) -> Result<(), AgentError> {
        self.repo
            .delete_by_id(record_id)
            .await
            .map_err(AgentError::from)
    }

    pub async fn find_by_thread_and_connection_id(
        &self,
        thread_id: &str,
        connection_id: Option<String>,
    ) -> Result<Option<ProofExchangeRecord>, AgentError> {
        self.repo
            .find_single_by_query(TagQuery::thread_and_connection(thread_id, connection_id))
            .await
            .map_err(AgentError::from)
    }

    pub async fn get_by_thread_and_connection_id(
        &self,
        thread_id: &str,
        connection_id: Option<String>,
    ) -> Result<ProofExchangeRecord, AgentError> {
        self.repo
            .get_single_by_query(TagQuery::thread_and_connection(thread_id, connection_id))
            .await
            .map_err(AgentError::from)
    }

    fn build_request(
        thread: Option<ThreadDecorator>,
        proof_request: &ProofRequest,
        comment: Option<String>,
    ) -> Result<RequestPresentationMessage, AgentError> {
        Ok(RequestPresentationMessage {
            id: generate_id(),
            thread,
            comment,
            request_attachments: vec![Attachment::from_data(
                INDY_PROOF_REQUEST_ATTACHMENT_ID,
                to_json(proof_request)?.as_bytes(),
            )],
        })
    }

    fn require_proof_request(record: &ProofExchangeRecord) -> Result<&ProofRequest, AgentError> {
        record.proof_request.as_ref().ok_or_else(|| {
            AgentError::ValidationError(format!("proof record {} has no proof request", record.id))
        })
    }

    async fn collect_ledger_objects(
        &self,
        record_id: &str,
        schema_id: &str,
        cred_def_id: &str,
        schemas: &mut Map<String, Value>,
        cred_defs: &mut Map<String, Value>,
    ) -> Result<(), AgentError> {
        if !schemas.contains_key(schema_id) {
            let schema_json = self
                .ledger
                .get_schema(schema_id.to_string())
                .await
                .map_err(|err| AgentError::collaborator("get_schema", record_id, err))?;
            schemas.insert(schema_id.to_string(), parse_json::<Value>(&schema_json)?);
        }

        if !cred_defs.contains_key(cred_def_id) {
            let cred_def_json = self
                .ledger
                .get_credential_definition(cred_def_id.to_string())
                .await
                .map_err(|err| {
                    AgentError::collaborator("get_credential_definition", record_id, err)
                })?;
            cred_defs.insert(cred_def_id.to_string(), parse_json::<Value>(&cred_def_json)?);
        }

        Ok(())
    }

    async fn update_state(
        &self,
        record: &mut ProofExchangeRecord,
        state: ProofState,
    ) -> Result<(), AgentError> {
        record.state.assert_transition(state)?;

        debug!("proof: {} moving from {} to {}", record.id, record.state, state);

        record.state = state;
        self.repo.update(record).await?;
        self.publish(record);
        Ok(())
    }

    fn publish(&self, record: &ProofExchangeRecord) {
        self.events.publish(ProofEvent {
            record: record.clone(),
        });
    }

    fn assert_connection_ready(connection: &ConnectionRecord) -> Result<(), AgentError> {
        if !connection.is_ready() {
            return Err(AgentError::ConnectionNotReady(format!(
                "connection {} is in state {}",
                connection.get_id(),
                connection.get_state()
            )));
        }

        Ok(())
    }

    async fn lock_exchange(&self, thread_id: &str, connection_id: &str) -> OwnedMutexGuard<()> {
        self.locks
            .acquire(ExchangeKey::new(PROTOCOL_NAME, thread_id, Some(connection_id)))
            .await
    }

    async fn lock_record(
        &self,
        record_id: &str,
    ) -> Result<(OwnedMutexGuard<()>, ProofExchangeRecord), AgentError> {
        let record = self.repo.get_by_id(record_id).await?;
        let guard = self
            .lock_exchange(&record.thread_id, &record.connection_id)
            .await;

        let record = self.repo.get_by_id(record_id).await?;
        Ok((guard, record))
    }
}
