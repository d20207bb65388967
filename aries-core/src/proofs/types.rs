use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display};

use rst_common::standard::serde::{self, Deserialize, Serialize};
use rst_common::standard::uuid::Uuid;

use crate::agent::state::ExchangeState;
use crate::connection::ConnectionRecord;

pub const PROTOCOL_NAME: &str = "present-proof";
pub const PROTOCOL_VERSION_V1: &str = "v1";
pub const PRESENTATION_PREVIEW_TYPE: &str =
    "https://didcomm.org/present-proof/1.0/presentation-preview";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "self::serde", rename_all = "snake_case")]
pub enum ProofState {
    ProposalSent,
    ProposalReceived,
    RequestSent,
    RequestReceived,
    PresentationSent,
    PresentationReceived,
    Done,
    Abandoned,
}

impl ProofState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProofState::ProposalSent => "proposal_sent",
            ProofState::ProposalReceived => "proposal_received",
            ProofState::RequestSent => "request_sent",
            ProofState::RequestReceived => "request_received",
            ProofState::PresentationSent => "presentation_sent",
            ProofState::PresentationReceived => "presentation_received",
            ProofState::Done => "done",
            ProofState::Abandoned => "abandoned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProofState::Done | ProofState::Abandoned)
    }
}

impl Display for ProofState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl ExchangeState for ProofState {
    fn can_transition_to(&self, next: &Self) -> bool {
        use ProofState::*;

        if *next == Abandoned {
            return !self.is_terminal();
        }

        matches!(
            (self, next),
            (ProposalSent, RequestReceived)
                | (ProposalReceived, RequestSent)
                | (RequestSent, ProposalReceived)
                | (RequestSent, PresentationReceived)
                | (RequestReceived, ProposalSent)
                | (RequestReceived, PresentationSent)
                | (PresentationSent, Done)
                | (PresentationReceived, Done)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(crate = "self::serde", rename_all = "snake_case")]
pub enum AutoAcceptProof {
    Always,
    ContentApproved,
    #[default]
    Never,
}

impl AutoAcceptProof {
    pub fn compose(record: Option<Self>, agent: Self) -> Self {
        record.unwrap_or(agent)
    }
}

/// `AttributeFilter` restricts which credentials may satisfy a requested attribute
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct AttributeFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_issuer_did: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer_did: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cred_def_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct ProofAttributeInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub names: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restrictions: Option<Vec<AttributeFilter>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct ProofPredicateInfo {
    pub name: String,
    pub p_type: String,
    pub p_value: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restrictions: Option<Vec<AttributeFilter>>,
}

/// `ProofRequest` is the indy proof request carried inside a request presentation attachment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct ProofRequest {
    pub name: String,
    pub version: String,
    pub nonce: String,

    #[serde(default)]
    pub requested_attributes: BTreeMap<String, ProofAttributeInfo>,

    #[serde(default)]
    pub requested_predicates: BTreeMap<String, ProofPredicateInfo>,
}

impl ProofRequest {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            nonce: generate_nonce(),
            requested_attributes: BTreeMap::new(),
            requested_predicates: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, referent: &str, info: ProofAttributeInfo) -> Self {
        self.requested_attributes.insert(referent.to_string(), info);
        self
    }

    pub fn with_predicate(mut self, referent: &str, info: ProofPredicateInfo) -> Self {
        self.requested_predicates.insert(referent.to_string(), info);
        self
    }
}

/// `generate_nonce` builds the decimal nonce indy expects in a proof request
pub fn generate_nonce() -> String {
    Uuid::new_v4().as_u128().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct RequestedAttribute {
    pub cred_id: String,
    pub revealed: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct RequestedPredicate {
    pub cred_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

/// `RequestedCredentials` maps every referent of a proof request onto a wallet credential
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct RequestedCredentials {
    #[serde(default)]
    pub self_attested_attributes: BTreeMap<String, String>,

    #[serde(default)]
    pub requested_attributes: BTreeMap<String, RequestedAttribute>,

    #[serde(default)]
    pub requested_predicates: BTreeMap<String, RequestedPredicate>,
}

impl RequestedCredentials {
    pub fn credential_ids(&self) -> BTreeSet<String> {
        self.requested_attributes
            .values()
            .map(|attr| attr.cred_id.to_owned())
            .chain(
                self.requested_predicates
                    .values()
                    .map(|pred| pred.cred_id.to_owned()),
            )
            .collect()
    }
}

/// `CredentialInfo` is the wallet view of a stored credential
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(crate = "self::serde")]
pub struct CredentialInfo {
    pub referent: String,
    pub schema_id: String,
    pub cred_def_id: String,

    #[serde(default)]
    pub attrs: BTreeMap<String, String>,

    #[serde(default)]
    pub rev_reg_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(crate = "self::serde")]
pub struct CredentialCandidate {
    pub cred_info: CredentialInfo,
}

/// `CredentialsForProofRequest` is what the wallet answers when asked which credentials can
/// satisfy a proof request
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(crate = "self::serde")]
pub struct CredentialsForProofRequest {
    #[serde(default)]
    pub attrs: BTreeMap<String, Vec<CredentialCandidate>>,

    #[serde(default)]
    pub predicates: BTreeMap<String, Vec<CredentialCandidate>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(crate = "self::serde")]
pub struct ProofIdentifier {
    pub schema_id: String,
    pub cred_def_id: String,

    #[serde(default)]
    pub rev_reg_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(crate = "self::serde")]
pub struct RevealedAttribute {
    pub raw: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(crate = "self::serde")]
pub struct RequestedProof {
    #[serde(default)]
    pub revealed_attrs: BTreeMap<String, RevealedAttribute>,
}

/// `IndyProof` holds the parts of a presentation the verifier reads back
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(crate = "self::serde")]
pub struct IndyProof {
    #[serde(default)]
    pub identifiers: Vec<ProofIdentifier>,

    #[serde(default)]
    pub requested_proof: RequestedProof,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct PresentationPreviewAttribute {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cred_def_id: Option<String>,

    #[serde(rename = "mime-type", default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct PresentationPreviewPredicate {
    pub name: String,
    pub cred_def_id: String,
    pub predicate: String,
    pub threshold: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct PresentationPreview {
    #[serde(rename = "@type")]
    pub preview_type: String,

    #[serde(default)]
    pub attributes: Vec<PresentationPreviewAttribute>,

    #[serde(default)]
    pub predicates: Vec<PresentationPreviewPredicate>,
}

impl PresentationPreview {
    pub fn new(
        attributes: Vec<PresentationPreviewAttribute>,
        predicates: Vec<PresentationPreviewPredicate>,
    ) -> Self {
        Self {
            preview_type: PRESENTATION_PREVIEW_TYPE.to_string(),
            attributes,
            predicates,
        }
    }

    /// `to_proof_request` turns the preview into a proof request restricted to the named
    /// credential definitions
    pub fn to_proof_request(&self, name: &str, version: &str) -> ProofRequest {
        let mut request = ProofRequest::new(name, version);

        for (index, attr) in self.attributes.iter().enumerate() {
            let referent = attr
                .referent
                .to_owned()
                .unwrap_or_else(|| format!("{}_{}", index, attr.name));

            let restrictions = attr.cred_def_id.as_ref().map(|cred_def_id| {
                vec![AttributeFilter {
                    cred_def_id: Some(cred_def_id.to_owned()),
                    ..Default::default()
                }]
            });

            request = request.with_attribute(
                &referent,
                ProofAttributeInfo {
                    name: Some(attr.name.to_owned()),
                    names: None,
                    restrictions,
                },
            );
        }

        for (index, pred) in self.predicates.iter().enumerate() {
            request = request.with_predicate(
                &format!("{}_{}_predicate", index, pred.name),
                ProofPredicateInfo {
                    name: pred.name.to_owned(),
                    p_type: pred.predicate.to_owned(),
                    p_value: pred.threshold,
                    restrictions: Some(vec![AttributeFilter {
                        cred_def_id: Some(pred.cred_def_id.to_owned()),
                        ..Default::default()
                    }]),
                },
            );
        }

        request
    }
}

#[derive(Debug, Clone)]
pub struct CreateProofProposalOptions {
    pub presentation_proposal: PresentationPreview,
    pub auto_accept_proof: Option<AutoAcceptProof>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateProofRequestOptions {
    pub connection: ConnectionRecord,
    pub proof_request: ProofRequest,
    pub auto_accept_proof: Option<AutoAcceptProof>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AcceptProofProposalOptions {
    pub name: String,
    pub version: String,
    pub auto_accept_proof: Option<AutoAcceptProof>,
    pub comment: Option<String>,
}

impl Default for AcceptProofProposalOptions {
    fn default() -> Self {
        Self {
            name: "proof-request".to_string(),
            version: "1.0".to_string(),
            auto_accept_proof: None,
            comment: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreatePresentationOptions {
    pub requested_credentials: RequestedCredentials,
    pub comment: Option<String>,
}
