use std::collections::BTreeMap;

use rst_common::standard::chrono::serde::{ts_seconds, ts_seconds_option};
use rst_common::standard::chrono::{DateTime, Utc};
use rst_common::standard::serde::{self, Deserialize, Serialize};
use rst_common::standard::serde_json;

use rstdev_domain::entity::ToJSON;
use rstdev_domain::BaseError;

use crate::agent::message::generate_id;
use crate::agent::state::{assert_protocol_version, ExchangeState};
use crate::agent::types::AgentError;
use crate::storage::types::{
    timestamp_now, RecordAccessor, Tags, TAG_CONNECTION_ID, TAG_STATE, TAG_THREAD_ID,
};

use super::types::{AutoAcceptProof, ProofRequest, ProofState, PROTOCOL_VERSION_V1};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct ProofExchangeRecord {
    pub(crate) id: String,
    pub(crate) connection_id: String,
    pub(crate) thread_id: String,
    pub(crate) state: ProofState,
    pub(crate) protocol_version: String,
    pub(crate) auto_accept_proof: Option<AutoAcceptProof>,
    pub(crate) proof_request: Option<ProofRequest>,
    pub(crate) is_verified: Option<bool>,
    pub(crate) revealed_attributes: BTreeMap<String, String>,
    pub(crate) error_message: Option<String>,

    #[serde(with = "ts_seconds")]
    pub(crate) created_at: DateTime<Utc>,

    #[serde(with = "ts_seconds_option")]
    pub(crate) updated_at: Option<DateTime<Utc>>,
}

impl ProofExchangeRecord {
    pub fn new(connection_id: String, thread_id: String, state: ProofState) -> Self {
        Self {
            id: generate_id(),
            connection_id,
            thread_id,
            state,
            protocol_version: PROTOCOL_VERSION_V1.to_string(),
            auto_accept_proof: None,
            proof_request: None,
            is_verified: None,
            revealed_attributes: BTreeMap::new(),
            error_message: None,
            created_at: timestamp_now(),
            updated_at: None,
        }
    }

    pub fn get_id(&self) -> String {
        self.id.to_owned()
    }

    pub fn get_connection_id(&self) -> String {
        self.connection_id.to_owned()
    }

    pub fn get_thread_id(&self) -> String {
        self.thread_id.to_owned()
    }

    pub fn get_state(&self) -> ProofState {
        self.state
    }

    pub fn get_auto_accept_proof(&self) -> Option<AutoAcceptProof> {
        self.auto_accept_proof
    }

    pub fn get_proof_request(&self) -> Option<&ProofRequest> {
        self.proof_request.as_ref()
    }

    pub fn get_is_verified(&self) -> Option<bool> {
        self.is_verified
    }

    /// `get_revealed_attributes` maps each disclosed attribute name to its raw value
    pub fn get_revealed_attributes(&self) -> BTreeMap<String, String> {
        self.revealed_attributes.to_owned()
    }

    pub fn get_error_message(&self) -> Option<String> {
        self.error_message.to_owned()
    }

    pub fn assert_state(&self, expected: &[ProofState]) -> Result<(), AgentError> {
        self.state.assert_in(expected)
    }

    pub fn assert_protocol_version(&self, expected: &str) -> Result<(), AgentError> {
        assert_protocol_version(&self.protocol_version, expected)
    }
}

impl ToJSON for ProofExchangeRecord {
    fn to_json(&self) -> Result<String, BaseError> {
        serde_json::to_string(self).map_err(|err| BaseError::ToJSONError(err.to_string()))
    }
}

impl TryFrom<Vec<u8>> for ProofExchangeRecord {
    type Error = BaseError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        serde_json::from_slice(&value).map_err(|err| BaseError::ToJSONError(err.to_string()))
    }
}

impl RecordAccessor for ProofExchangeRecord {
    const RECORD_TYPE: &'static str = "ProofRecord";

    fn get_id(&self) -> String {
        self.id.to_owned()
    }

    fn get_tags(&self) -> Tags {
        let mut tags = Tags::new();
        tags.insert(TAG_THREAD_ID.to_string(), self.thread_id.to_owned());
        tags.insert(TAG_CONNECTION_ID.to_string(), self.connection_id.to_owned());
        tags.insert(TAG_STATE.to_string(), self.state.as_str().to_string());
        tags
    }

    fn get_created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn get_updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    fn touch(&mut self) {
        self.updated_at = Some(timestamp_now())
    }
}
