use rst_common::standard::async_trait::async_trait;
use rst_common::standard::serde::{self, Deserialize, Serialize};
use rst_common::standard::serde_json::Value;
use rst_common::with_errors::thiserror::{self, Error};

use crate::storage::types::StorageError;

use super::context::OutboundMessage;

/// `MessageError` covers everything that can go wrong while turning wire JSON into typed
/// messages and back
#[derive(Debug, PartialEq, Error, Clone)]
pub enum MessageError {
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("missing message type")]
    MissingMessageType,

    #[error("decode error: {0}")]
    DecodeError(String),

    #[error("encode error: {0}")]
    EncodeError(String),

    #[error("attachment error: {0}")]
    AttachmentError(String),

    #[error("unexpected message: expected {expected}, got {actual}")]
    UnexpectedMessage { expected: String, actual: String },
}

/// `AgentError` is the error surfaced by protocol services, handlers and the dispatcher
#[derive(Debug, PartialEq, Error, Clone)]
pub enum AgentError {
    #[error("invalid state: expected {expected}, actual {actual}")]
    InvalidState { expected: String, actual: String },

    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("invalid protocol version: {0}")]
    InvalidProtocolVersion(String),

    #[error("missing attachment: {0}")]
    MissingAttachment(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("connection not ready: {0}")]
    ConnectionNotReady(String),

    #[error("connection not found: {0}")]
    ConnectionNotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("message error: {0}")]
    Message(#[from] MessageError),

    #[error("{operation} failed for {record_id}: {message}")]
    CollaboratorError {
        operation: String,
        record_id: String,
        message: String,
    },

    #[error("external error: {0}")]
    ExternalError(String),

    #[error("transport error: {0}")]
    TransportError(String),

    #[error("unhandled message type: {0}")]
    UnhandledMessageType(String),

    #[error("duplicate handler: {0}")]
    DuplicateHandler(String),
}

impl AgentError {
    /// `collaborator` wraps a failure returned by a wallet, ledger or revocation collaborator
    /// with the operation and the exchange record it was running for
    pub fn collaborator(operation: &str, record_id: &str, err: AgentError) -> Self {
        AgentError::CollaboratorError {
            operation: operation.to_string(),
            record_id: record_id.to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct DidInfo {
    pub did: String,
    pub verkey: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRequestOutput {
    pub request_json: String,
    pub request_metadata_json: String,
}

/// `WalletBuilder` is the anoncreds and key management collaborator
///
/// Every payload crossing this boundary is an opaque JSON string produced or consumed by the
/// wallet. The engine only reads the few identifiers it needs to correlate ledger lookups.
#[async_trait]
pub trait WalletBuilder: Send + Sync {
    async fn create_did(&self) -> Result<DidInfo, AgentError>;
    fn master_secret_id(&self) -> String;

    async fn create_credential_offer(&self, cred_def_id: String) -> Result<String, AgentError>;
    async fn create_credential_request(
        &self,
        holder_did: String,
        offer_json: String,
        cred_def_json: String,
        master_secret_id: String,
    ) -> Result<CredentialRequestOutput, AgentError>;
    async fn create_credential(
        &self,
        offer_json: String,
        request_json: String,
        values_json: String,
    ) -> Result<String, AgentError>;
    async fn store_credential(
        &self,
        request_metadata_json: String,
        credential_json: String,
        cred_def_json: String,
        rev_reg_def_json: Option<String>,
    ) -> Result<String, AgentError>;
    async fn get_credential(&self, credential_id: String) -> Result<String, AgentError>;

    async fn get_credentials_for_proof_request(
        &self,
        proof_request_json: String,
    ) -> Result<String, AgentError>;
    async fn create_proof(
        &self,
        proof_request_json: String,
        requested_credentials_json: String,
        master_secret_id: String,
        schemas_json: String,
        cred_defs_json: String,
    ) -> Result<String, AgentError>;
    async fn verify_proof(
        &self,
        proof_request_json: String,
        proof_json: String,
        schemas_json: String,
        cred_defs_json: String,
    ) -> Result<bool, AgentError>;
}

/// `LedgerBuilder` is the read side of the verifiable data registry
#[async_trait]
pub trait LedgerBuilder: Send + Sync {
    async fn get_schema(&self, schema_id: String) -> Result<String, AgentError>;
    async fn get_credential_definition(&self, cred_def_id: String) -> Result<String, AgentError>;
    async fn get_revocation_registry_definition(
        &self,
        rev_reg_id: String,
    ) -> Result<String, AgentError>;
}

#[async_trait]
pub trait RevocationBuilder: Send + Sync {
    /// `download_tails` fetches the tails file of a revocation registry and returns its
    /// local location
    async fn download_tails(&self, rev_reg_def_json: String) -> Result<String, AgentError>;
}

/// `TransportBuilder` owns envelope encryption and delivery
#[async_trait]
pub trait TransportBuilder: Send + Sync {
    async fn send(&self, message: OutboundMessage) -> Result<(), AgentError>;

    /// `receive_packed` hands back an encrypted envelope fetched from a mediator, the transport
    /// unpacks it and feeds the plaintext into the agent's inbound pipeline
    async fn receive_packed(&self, packed: Value) -> Result<(), AgentError>;
}
