use std::sync::Arc;

use rst_common::standard::serde_json;
use rst_common::with_logging::log::{debug, info};
use rst_common::with_tokio::tokio::sync::OwnedMutexGuard;

use crate::agent::context::InboundMessageContext;
use crate::agent::dependencies::{spawn_best_effort, AgentDependencies};
use crate::agent::events::{CredentialEvent, EventBus};
use crate::agent::lock::{ExchangeKey, ExchangeLocks};
use crate::agent::message::{generate_id, AckStatus, Attachment, DidCommMessage, ThreadDecorator};
use crate::agent::state::ExchangeState;
use crate::agent::types::{
    AgentError, LedgerBuilder, MessageError, RevocationBuilder, WalletBuilder,
};
use crate::connection::ConnectionRecord;
use crate::storage::types::{StorageError, TagQuery};
use crate::storage::{DidCommMessageRepository, DidCommMessageRole, Repository};

use super::messages::{
    CredentialAckMessage, IssueCredentialMessage, OfferCredentialMessage,
    ProposeCredentialMessage, RequestCredentialMessage, INDY_CREDENTIAL_ATTACHMENT_ID,
    INDY_CREDENTIAL_OFFER_ATTACHMENT_ID, INDY_CREDENTIAL_REQUEST_ATTACHMENT_ID,
};
use super::record::CredentialExchangeRecord;
use super::types::{
    AcceptProposalOptions, CreateCredentialOptions, CreateOfferOptions, CreateProposalOptions,
    CreateRequestOptions, CredentialPreview, CredentialRecordBinding, CredentialState,
    IndyCredentialInfo, CONNECTIONLESS_OFFER_ID, INDY_CREDENTIAL_RECORD_TYPE, PROTOCOL_NAME,
    PROTOCOL_VERSION_V1,
};

fn parse_credential_info(json: &str) -> Result<IndyCredentialInfo, AgentError> {
    serde_json::from_str::<IndyCredentialInfo>(json)
        .map_err(|err| AgentError::Message(MessageError::DecodeError(err.to_string())))
}

/// `CredentialService` runs the issue credential exchange for both the issuer and the holder
///
/// Every transition checks the current state and the protocol version before any write, persists
/// the record and then publishes exactly one [`CredentialEvent`]. Concurrent messages for the
/// same `(thread, connection)` pair are serialized through [`ExchangeLocks`].
#[derive(Clone)]
pub struct CredentialService {
    repo: Repository<CredentialExchangeRecord>,
    connections: Repository<ConnectionRecord>,
    messages: DidCommMessageRepository,
    wallet: Arc<dyn WalletBuilder>,
    ledger: Arc<dyn LedgerBuilder>,
    revocation: Arc<dyn RevocationBuilder>,
    events: EventBus,
    locks: ExchangeLocks,
}

impl CredentialService {
    pub fn new(deps: &AgentDependencies) -> Self {
        Self {
            repo: deps.repository(),
            connections: deps.repository(),
            messages: deps.message_repository(),
            wallet: deps.wallet.clone(),
            ledger: deps.ledger.clone(),
            revocation: deps.revocation.clone(),
            events: deps.events.clone(),
            locks: deps.locks.clone(),
        }
    }

    pub async fn create_proposal(
        &self,
        connection: &ConnectionRecord,
        options: CreateProposalOptions,
    ) -> Result<(ProposeCredentialMessage, CredentialExchangeRecord), AgentError> {
        Self::assert_connection_ready(connection)?;

        let message = ProposeCredentialMessage {
            id: generate_id(),
            thread: None,
            comment: options.comment,
            credential_proposal: options.credential_proposal,
            schema_issuer_did: options.schema_issuer_did,
            schema_id: options.schema_id,
            schema_name: options.schema_name,
            schema_version: options.schema_version,
            cred_def_id: options.credential_definition_id.to_owned(),
            issuer_did: options.issuer_did,
        };

        let mut record = CredentialExchangeRecord::new(
            connection.get_id(),
            message.get_thread_id(),
            CredentialState::ProposalSent,
        );
        record.credential_definition_id = options.credential_definition_id;
        record.auto_accept_credential = options.auto_accept_credential;

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
    ) -> Result<CredentialExchangeRecord, AgentError> {
        let message: ProposeCredentialMessage = ctx.message.clone().try_into()?;
        let connection = ctx.assert_ready_connection()?;
        let thread_id = message.get_thread_id();

        let _guard = self.lock_exchange(&thread_id, &connection.get_id()).await;
        let existing = self
            .find_by_thread_and_connection_id(&thread_id, Some(connection.get_id()))
            .await?;

        match existing {
            Some(mut record) => {
                record.assert_protocol_version(PROTOCOL_VERSION_V1)?;
                record.assert_state(&[CredentialState::OfferSent])?;

                self.messages
                    .save_agent_message(DidCommMessageRole::Receiver, &message, &record.id)
                    .await?;
                self.update_state(&mut record, CredentialState::ProposalReceived)
                    .await?;
                Ok(record)
            }
            None => {
                let mut record = CredentialExchangeRecord::new(
                    connection.get_id(),
                    thread_id,
                    CredentialState::ProposalReceived,
                );
                record.credential_definition_id = message.cred_def_id.to_owned();

                self.repo.save(&record).await?;
                self.messages
                    .save_agent_message(DidCommMessageRole::Receiver, &message, &record.id)
                    .await?;
                self.publish(&record);
                Ok(record)
            }
        }
    }

    /// `accept_proposal` answers a received proposal with an offer on the same thread
    pub async fn accept_proposal(
        &self,
        record_id: &str,
        options: AcceptProposalOptions,
    ) -> Result<(OfferCredentialMessage, CredentialExchangeRecord), AgentError> {
        let (_guard, mut record) = self.lock_record(record_id).await?;
        record.assert_protocol_version(PROTOCOL_VERSION_V1)?;
        record.assert_state(&[CredentialState::ProposalReceived])?;

        let proposal = self
            .messages
            .get_agent_message::<ProposeCredentialMessage>(&record.id)
            .await?;

        let cred_def_id = options
            .credential_definition_id
            .or(proposal.cred_def_id)
            .ok_or_else(|| {
                AgentError::ValidationError("credential definition id was missing".to_string())
            })?;

        let attributes = options
            .attributes
            .or_else(|| proposal.credential_proposal.map(|preview| preview.attributes))
            .ok_or_else(|| {
                AgentError::ValidationError("credential attributes were missing".to_string())
            })?;

        let offer = self
            .build_offer(
                &record.id,
                Some(ThreadDecorator::new(record.thread_id.to_owned())),
                &cred_def_id,
                CredentialPreview::new(attributes.to_owned()),
                options.comment,
            )
            .await?;

        record.credential_definition_id = Some(cred_def_id);
        record.credential_attributes = Some(attributes);
        if options.auto_accept_credential.is_some() {
            record.auto_accept_credential = options.auto_accept_credential;
        }

        self.messages
            .save_agent_message(DidCommMessageRole::Sender, &offer, &record.id)
            .await?;
        self.update_state(&mut record, CredentialState::OfferSent)
            .await?;

        Ok((offer, record))
    }

    /// `create_offer` starts an exchange on the issuer side, a missing connection builds a
    /// connection-less offer bound later by the holder's request
    pub async fn create_offer(
        &self,
        options: CreateOfferOptions,
    ) -> Result<(OfferCredentialMessage, CredentialExchangeRecord), AgentError> {
        if options.credential_definition_id.is_empty() {
            return Err(AgentError::ValidationError(
                "credential definition id was missing".to_string(),
            ));
        }

        if options.attributes.is_empty() {
            return Err(AgentError::ValidationError(
                "credential attributes were missing".to_string(),
            ));
        }

        let connection_id = match &options.connection {
            Some(connection) => {
                Self::assert_connection_ready(connection)?;
                connection.get_id()
            }
            None => CONNECTIONLESS_OFFER_ID.to_string(),
        };

        let offer = self
            .build_offer(
                &connection_id,
                None,
                &options.credential_definition_id,
                CredentialPreview::new(options.attributes.to_owned()),
                options.comment,
            )
            .await?;

        let mut record = CredentialExchangeRecord::new(
            connection_id,
            offer.get_thread_id(),
            CredentialState::OfferSent,
        );
        record.credential_definition_id = Some(options.credential_definition_id);
        record.credential_attributes = Some(options.attributes);
        record.auto_accept_credential = options.auto_accept_credential;

        self.repo.save(&record).await?;
        self.messages
            .save_agent_message(DidCommMessageRole::Sender, &offer, &record.id)
            .await?;
        self.publish(&record);

        info!("credential: offer created on thread {}", record.thread_id);
        Ok((offer, record))
    }

    pub async fn process_offer(
        &self,
        ctx: &InboundMessageContext,
    ) -> Result<CredentialExchangeRecord, AgentError> {
        let message: OfferCredentialMessage = ctx.message.clone().try_into()?;
        let connection = ctx.assert_ready_connection()?;
        let offer_json = message.get_credential_offer()?;
        let offer_info = parse_credential_info(&offer_json)?;
        let thread_id = message.get_thread_id();

        let _guard = self.lock_exchange(&thread_id, &connection.get_id()).await;
        let existing = self
            .find_by_thread_and_connection_id(&thread_id, Some(connection.get_id()))
            .await?;

        match existing {
            Some(mut record) => {
                record.assert_protocol_version(PROTOCOL_VERSION_V1)?;
                record.assert_state(&[
                    CredentialState::ProposalSent,
                    CredentialState::OfferReceived,
                ])?;

                if record.credential_attributes.is_none() {
                    record.credential_attributes =
                        Some(message.credential_preview.attributes.to_owned());
                }
                record.credential_definition_id = Some(offer_info.cred_def_id);

                self.messages
                    .save_agent_message(DidCommMessageRole::Receiver, &message, &record.id)
                    .await?;
                self.update_state(&mut record, CredentialState::OfferReceived)
                    .await?;
                Ok(record)
            }
            None => {
                let mut record = CredentialExchangeRecord::new(
                    connection.get_id(),
                    thread_id,
                    CredentialState::OfferReceived,
                );
                record.credential_attributes =
                    Some(message.credential_preview.attributes.to_owned());
                record.credential_definition_id = Some(offer_info.cred_def_id);

                self.repo.save(&record).await?;
                self.messages
                    .save_agent_message(DidCommMessageRole::Receiver, &message, &record.id)
                    .await?;
                self.publish(&record);
                Ok(record)
            }
        }
    }

    pub async fn create_request(
        &self,
        record_id: &str,
        options: CreateRequestOptions,
    ) -> Result<(RequestCredentialMessage, CredentialExchangeRecord), AgentError> {
        let (_guard, mut record) = self.lock_record(record_id).await?;
        record.assert_protocol_version(PROTOCOL_VERSION_V1)?;
        record.assert_state(&[CredentialState::OfferReceived])?;

        let offer = self
            .messages
            .get_agent_message::<OfferCredentialMessage>(&record.id)
            .await?;
        let offer_json = offer.get_credential_offer()?;
        let offer_info = parse_credential_info(&offer_json)?;

        let cred_def_json = self
            .ledger
            .get_credential_definition(offer_info.cred_def_id.to_owned())
            .await
            .map_err(|err| AgentError::collaborator("get_credential_definition", &record.id, err))?;

        let holder_did = match options.holder_did {
            Some(did) => did,
            None => self.get_connection(&record.connection_id).await?.get_did(),
        };

        let output = self
            .wallet
            .create_credential_request(
                holder_did,
                offer_json,
                cred_def_json,
                self.wallet.master_secret_id(),
            )
            .await
            .map_err(|err| AgentError::collaborator("create_credential_request", &record.id, err))?;

        let message = RequestCredentialMessage {
            id: generate_id(),
            thread: Some(ThreadDecorator::new(record.thread_id.to_owned())),
            comment: options.comment,
            request_attachments: vec![Attachment::from_data(
                INDY_CREDENTIAL_REQUEST_ATTACHMENT_ID,
                output.request_json.as_bytes(),
            )],
        };

        record.indy_request_metadata = Some(output.request_metadata_json);
        record.credential_definition_id = Some(offer_info.cred_def_id);
        if options.auto_accept_credential.is_some() {
            record.auto_accept_credential = options.auto_accept_credential;
        }

        self.messages
            .save_agent_message(DidCommMessageRole::Sender, &message, &record.id)
            .await?;
        self.update_state(&mut record, CredentialState::RequestSent)
            .await?;

        Ok((message, record))
    }

    /// `process_request` binds a connection-less offer to the connection the request arrived on
    pub async fn process_request(
        &self,
        ctx: &InboundMessageContext,
    ) -> Result<CredentialExchangeRecord, AgentError> {
        let message: RequestCredentialMessage = ctx.message.clone().try_into()?;
        let connection = ctx.assert_ready_connection()?;
        message.assert_credential_request()?;
        let thread_id = message.get_thread_id();

        let _guard = self.lock_exchange(&thread_id, &connection.get_id()).await;
        let bound = self
            .find_by_thread_and_connection_id(&thread_id, Some(connection.get_id()))
            .await?;

        let mut record = match bound {
            Some(record) => record,
            None => {
                self.get_by_thread_and_connection_id(
                    &thread_id,
                    Some(CONNECTIONLESS_OFFER_ID.to_string()),
                )
                .await?
            }
        };

        record.assert_protocol_version(PROTOCOL_VERSION_V1)?;
        record.assert_state(&[CredentialState::OfferSent])?;

        if record.connection_id == CONNECTIONLESS_OFFER_ID {
            debug!(
                "credential: binding offer {} to connection {}",
                record.id,
                connection.get_id()
            );
            record.connection_id = connection.get_id();
        }

        self.messages
            .save_agent_message(DidCommMessageRole::Receiver, &message, &record.id)
            .await?;
        self.update_state(&mut record, CredentialState::RequestReceived)
            .await?;

        Ok(record)
    }

    pub async fn create_credential(
        &self,
        record_id: &str,
        options: CreateCredentialOptions,
    ) -> Result<(IssueCredentialMessage, CredentialExchangeRecord), AgentError> {
        let (_guard, mut record) = self.lock_record(record_id).await?;
        record.assert_protocol_version(PROTOCOL_VERSION_V1)?;
        record.assert_state(&[CredentialState::RequestReceived])?;

        let offer = self
            .messages
            .get_agent_message::<OfferCredentialMessage>(&record.id)
            .await?;
        let request = self
            .messages
            .get_agent_message::<RequestCredentialMessage>(&record.id)
            .await?;

        let attributes = record
            .credential_attributes
            .to_owned()
            .unwrap_or_else(|| offer.credential_preview.attributes.to_owned());
        let values = CredentialPreview::new(attributes).to_values();

        let credential_json = self
            .wallet
            .create_credential(
                offer.get_credential_offer()?,
                request.get_credential_request()?,
                values.to_string(),
            )
            .await
            .map_err(|err| AgentError::collaborator("create_credential", &record.id, err))?;

        let message = IssueCredentialMessage {
            id: generate_id(),
            thread: Some(ThreadDecorator::new(record.thread_id.to_owned())),
            comment: options.comment,
            credential_attachments: vec![Attachment::from_data(
                INDY_CREDENTIAL_ATTACHMENT_ID,
                credential_json.as_bytes(),
            )],
        };

        if options.auto_accept_credential.is_some() {
            record.auto_accept_credential = options.auto_accept_credential;
        }

        self.messages
            .save_agent_message(DidCommMessageRole::Sender, &message, &record.id)
            .await?;
        self.update_state(&mut record, CredentialState::CredentialIssued)
            .await?;

        Ok((message, record))
    }

    /// `process_credential` stores the issued credential in the wallet
    ///
    /// The tails file of a revocable credential is fetched by a detached task, its failure is
    /// only logged.
    pub async fn process_credential(
        &self,
        ctx: &InboundMessageContext,
    ) -> Result<CredentialExchangeRecord, AgentError> {
        let message: IssueCredentialMessage = ctx.message.clone().try_into()?;
        let connection = ctx.assert_ready_connection()?;
        let credential_json = message.get_credential()?;
        let credential_info = parse_credential_info(&credential_json)?;
        let thread_id = message.get_thread_id();

        let _guard = self.lock_exchange(&thread_id, &connection.get_id()).await;
        let mut record = self
            .get_by_thread_and_connection_id(&thread_id, Some(connection.get_id()))
            .await?;

        record.assert_protocol_version(PROTOCOL_VERSION_V1)?;
        record.assert_state(&[CredentialState::RequestSent])?;

        let request_metadata = record.indy_request_metadata.to_owned().ok_or_else(|| {
            AgentError::ValidationError(format!(
                "credential record {} has no request metadata",
                record.id
            ))
        })?;

        let cred_def_json = self
            .ledger
            .get_credential_definition(credential_info.cred_def_id.to_owned())
            .await
            .map_err(|err| AgentError::collaborator("get_credential_definition", &record.id, err))?;

        let rev_reg_def_json = match &credential_info.rev_reg_id {
            Some(rev_reg_id) => {
                let definition = self
                    .ledger
                    .get_revocation_registry_definition(rev_reg_id.to_owned())
                    .await
                    .map_err(|err| {
                        AgentError::collaborator(
                            "get_revocation_registry_definition",
                            &record.id,
                            err,
                        )
                    })?;

                Some(definition)
            }
            None => None,
        };

        let tails_definition = rev_reg_def_json.to_owned();
        let credential_id = self
            .wallet
            .store_credential(
                request_metadata,
                credential_json,
                cred_def_json,
                rev_reg_def_json,
            )
            .await
            .map_err(|err| AgentError::collaborator("store_credential", &record.id, err))?;

        if let Some(definition) = tails_definition {
            let revocation = self.revocation.clone();
            spawn_best_effort("download_tails", async move {
                revocation
                    .download_tails(definition)
                    .await
                    .map(|location| debug!("credential: tails stored at {}", location))
            });
        }

        record.credentials.push(CredentialRecordBinding {
            credential_record_type: INDY_CREDENTIAL_RECORD_TYPE.to_string(),
            credential_record_id: credential_id,
        });

        self.messages
            .save_agent_message(DidCommMessageRole::Receiver, &message, &record.id)
            .await?;
        self.update_state(&mut record, CredentialState::CredentialReceived)
            .await?;

        Ok(record)
    }

    pub async fn create_ack(
        &self,
        record_id: &str,
    ) -> Result<(CredentialAckMessage, CredentialExchangeRecord), AgentError> {
        let (_guard, mut record) = self.lock_record(record_id).await?;
        record.assert_protocol_version(PROTOCOL_VERSION_V1)?;
        record.assert_state(&[CredentialState::CredentialReceived])?;

        let message = CredentialAckMessage {
            id: generate_id(),
            thread: Some(ThreadDecorator::new(record.thread_id.to_owned())),
            status: AckStatus::Ok,
        };

        self.update_state(&mut record, CredentialState::Done)
            .await?;
        Ok((message, record))
    }

    pub async fn process_ack(
        &self,
        ctx: &InboundMessageContext,
    ) -> Result<CredentialExchangeRecord, AgentError> {
        let message: CredentialAckMessage = ctx.message.clone().try_into()?;
        let connection = ctx.assert_ready_connection()?;
        let thread_id = message.get_thread_id();

        let _guard = self.lock_exchange(&thread_id, &connection.get_id()).await;
        let mut record = self
            .get_by_thread_and_connection_id(&thread_id, Some(connection.get_id()))
            .await?;

        record.assert_protocol_version(PROTOCOL_VERSION_V1)?;
        record.assert_state(&[CredentialState::CredentialIssued])?;

        self.update_state(&mut record, CredentialState::Done)
            .await?;
        Ok(record)
    }

    /// `abandon` ends a non terminal exchange after an irrecoverable failure
    pub async fn abandon(
        &self,
        record_id: &str,
        reason: &str,
    ) -> Result<CredentialExchangeRecord, AgentError> {
        let (_guard, mut record) = self.lock_record(record_id).await?;
        record.error_message = Some(reason.to_string());

        self.update_state(&mut record, CredentialState::Abandoned)
            .await?;
        Ok(record)
    }

    pub async fn find_proposal_message(
        &self,
        record_id: &str,
    ) -> Result<Option<ProposeCredentialMessage>, AgentError> {
        self.messages
            .find_agent_message::<ProposeCredentialMessage>(record_id)
            .await
            .map_err(AgentError::from)
    }

    pub async fn find_offer_message(
        &self,
        record_id: &str,
    ) -> Result<Option<OfferCredentialMessage>, AgentError> {
        self.messages
            .find_agent_message::<OfferCredentialMessage>(record_id)
            .await
            .map_err(AgentError::from)
    }

    pub async fn find_by_id(
        &self,
        record_id: &str,
    ) -> Result<Option<CredentialExchangeRecord>, AgentError> {
        self.repo.find_by_id(record_id).await.map_err(AgentError::from)
    }

    pub async fn get_by_id(&self, record_id: &str) -> Result<CredentialExchangeRecord, AgentError> {
        self.repo.get_by_id(record_id).await.map_err(AgentError::from)
    }

    pub async fn get_all(&self) -> Result<Vec<CredentialExchangeRecord>, AgentError> {
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
    ) -> Result<Option<CredentialExchangeRecord>, AgentError> {
        self.repo
            .find_single_by_query(TagQuery::thread_and_connection(thread_id, connection_id))
            .await
            .map_err(AgentError::from)
    }

    pub async fn get_by_thread_and_connection_id(
        &self,
        thread_id: &str,
        connection_id: Option<String>,
    ) -> Result<CredentialExchangeRecord, AgentError> {
        self.repo
            .get_single_by_query(TagQuery::thread_and_connection(thread_id, connection_id))
            .await
            .map_err(AgentError::from)
    }

    async fn build_offer(
        &self,
        context_id: &str,
        thread: Option<ThreadDecorator>,
        cred_def_id: &str,
        preview: CredentialPreview,
        comment: Option<String>,
    ) -> Result<OfferCredentialMessage, AgentError> {
        let offer_json = self
            .wallet
            .create_credential_offer(cred_def_id.to_string())
            .await
            .map_err(|err| AgentError::collaborator("create_credential_offer", context_id, err))?;

        Ok(OfferCredentialMessage {
            id: generate_id(),
            thread,
            comment,
            credential_preview: preview,
            offer_attachments: vec![Attachment::from_data(
                INDY_CREDENTIAL_OFFER_ATTACHMENT_ID,
                offer_json.as_bytes(),
            )],
        })
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
        record: &mut CredentialExchangeRecord,
        state: CredentialState,
    ) -> Result<(), AgentError> {
        record.state.assert_transition(state)?;

        debug!(
            "credential: {} moving from {} to {}",
            record.id, record.state, state
        );

        record.state = state;
        self.repo.update(record).await?;
        self.publish(record);
        Ok(())
    }

    fn publish(&self, record: &CredentialExchangeRecord) {
        self.events.publish(CredentialEvent {
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
    ) -> Result<(OwnedMutexGuard<()>, CredentialExchangeRecord), AgentError> {
        let record = self.repo.get_by_id(record_id).await?;
        let guard = self
            .lock_exchange(&record.thread_id, &record.connection_id)
            .await;

        let record = self.repo.get_by_id(record_id).await?;
        Ok((guard, record))
    }
}
