use std::fmt::{self, Display};

use rst_common::standard::serde::{self, Deserialize, Serialize};
use rst_common::standard::serde_json::{Map, Value};

use crate::agent::state::ExchangeState;
use crate::connection::ConnectionRecord;

pub const PROTOCOL_NAME: &str = "issue-credential";
pub const PROTOCOL_VERSION_V1: &str = "v1";

/// `CONNECTIONLESS_OFFER_ID` is the connection id of an offer created without a connection, it
/// is replaced by the real connection id when the request arrives
pub const CONNECTIONLESS_OFFER_ID: &str = "connectionless-offer";

pub const CREDENTIAL_PREVIEW_TYPE: &str =
    "https://didcomm.org/issue-credential/1.0/credential-preview";
pub const INDY_CREDENTIAL_RECORD_TYPE: &str = "indy";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "self::serde", rename_all = "snake_case")]
pub enum CredentialState {
    ProposalSent,
    ProposalReceived,
    OfferSent,
    OfferReceived,
    RequestSent,
    RequestReceived,
    CredentialIssued,
    CredentialReceived,
    Done,
    Abandoned,
}

impl CredentialState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialState::ProposalSent => "proposal_sent",
            CredentialState::ProposalReceived => "proposal_received",
            CredentialState::OfferSent => "offer_sent",
            CredentialState::OfferReceived => "offer_received",
            CredentialState::RequestSent => "request_sent",
            CredentialState::RequestReceived => "request_received",
            CredentialState::CredentialIssued => "credential_issued",
            CredentialState::CredentialReceived => "credential_received",
            CredentialState::Done => "done",
            CredentialState::Abandoned => "abandoned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CredentialState::Done | CredentialState::Abandoned)
    }
}

impl Display for CredentialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl ExchangeState for CredentialState {
    fn can_transition_to(&self, next: &Self) -> bool {
        use CredentialState::*;

        if *next == Abandoned {
            return !self.is_terminal();
        }

        matches!(
            (self, next),
            (ProposalSent, OfferReceived)
                | (ProposalReceived, OfferSent)
                | (OfferSent, ProposalReceived)
                | (OfferSent, RequestReceived)
                | (OfferReceived, OfferReceived)
                | (OfferReceived, RequestSent)
                | (RequestSent, CredentialReceived)
                | (RequestReceived, CredentialIssued)
                | (CredentialIssued, Done)
                | (CredentialReceived, Done)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(crate = "self::serde", rename_all = "snake_case")]
pub enum AutoAcceptCredential {
    Always,
    ContentApproved,
    #[default]
    Never,
}

impl AutoAcceptCredential {
    /// `compose` lets the value stored on the record override the agent wide default
    pub fn compose(record: Option<Self>, agent: Self) -> Self {
        record.unwrap_or(agent)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct CredentialPreviewAttribute {
    pub name: String,

    #[serde(rename = "mime-type", default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    pub value: String,
}

impl CredentialPreviewAttribute {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            mime_type: Some("text/plain".to_string()),
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct CredentialPreview {
    #[serde(rename = "@type")]
    pub preview_type: String,

    pub attributes: Vec<CredentialPreviewAttribute>,
}

impl CredentialPreview {
    pub fn new(attributes: Vec<CredentialPreviewAttribute>) -> Self {
        Self {
            preview_type: CREDENTIAL_PREVIEW_TYPE.to_string(),
            attributes,
        }
    }

    /// `to_values` builds the raw credential values handed to the wallet, which computes the
    /// encoded form
    pub fn to_values(&self) -> Value {
        let values: Map<String, Value> = self
            .attributes
            .iter()
            .map(|attr| {
                let mut raw = Map::new();
                raw.insert("raw".to_string(), Value::String(attr.value.to_owned()));
                (attr.name.to_owned(), Value::Object(raw))
            })
            .collect();

        Value::Object(values)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct CredentialRecordBinding {
    pub credential_record_type: String,
    pub credential_record_id: String,
}

/// `IndyCredentialInfo` holds the identifiers read out of an offer or an issued credential
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(crate = "self::serde")]
pub struct IndyCredentialInfo {
    pub cred_def_id: String,

    #[serde(default)]
    pub schema_id: Option<String>,

    #[serde(default)]
    pub rev_reg_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateProposalOptions {
    pub credential_proposal: Option<CredentialPreview>,
    pub schema_issuer_did: Option<String>,
    pub schema_id: Option<String>,
    pub schema_name: Option<String>,
    pub schema_version: Option<String>,
    pub credential_definition_id: Option<String>,
    pub issuer_did: Option<String>,
    pub auto_accept_credential: Option<AutoAcceptCredential>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AcceptProposalOptions {
    pub credential_definition_id: Option<String>,
    pub attributes: Option<Vec<CredentialPreviewAttribute>>,
    pub auto_accept_credential: Option<AutoAcceptCredential>,
    pub comment: Option<String>,
}

/// `CreateOfferOptions` without a connection builds a connection-less offer
#[derive(Debug, Clone, Default)]
pub struct CreateOfferOptions {
    pub connection: Option<ConnectionRecord>,
    pub credential_definition_id: String,
    pub attributes: Vec<CredentialPreviewAttribute>,
    pub auto_accept_credential: Option<AutoAcceptCredential>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateRequestOptions {
    pub holder_did: Option<String>,
    pub auto_accept_credential: Option<AutoAcceptCredential>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateCredentialOptions {
    pub auto_accept_credential: Option<AutoAcceptCredential>,
    pub comment: Option<String>,
}
