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

use super::types::{
    AutoAcceptCredential, CredentialPreviewAttribute, CredentialRecordBinding, CredentialState,
    PROTOCOL_VERSION_V1,
};

const TAG_CREDENTIAL_IDS: &str = "credential_ids";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct CredentialExchangeRecord {
    pub(crate) id: String,
    pub(crate) connection_id: String,
    pub(crate) thread_id: String,
    pub(crate) state: CredentialState,
    pub(crate) protocol_version: String,
    pub(crate) auto_accept_credential: Option<AutoAcceptCredential>,
    pub(crate) credential_attributes: Option<Vec<CredentialPreviewAttribute>>,
    pub(crate) credential_definition_id: Option<String>,
    pub(crate) indy_request_metadata: Option<String>,
    pub(crate) credentials: Vec<CredentialRecordBinding>,
    pub(crate) error_message: Option<String>,

    #[serde(with = "ts_seconds")]
    pub(crate) created_at: DateTime<Utc>,

    #[serde(with = "ts_seconds_option")]
    pub(crate) updated_at: Option<DateTime<Utc>>,
}

impl CredentialExchangeRecord {
    pub fn new(connection_id: String, thread_id: String, state: CredentialState) -> Self {
        Self {
            id: generate_id(),
            connection_id,
            thread_id,
            state,
            protocol_version: PROTOCOL_VERSION_V1.to_string(),
            auto_accept_credential: None,
            credential_attributes: None,
            credential_definition_id: None,
            indy_request_metadata: None,
            credentials: Vec::new(),
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

    pub fn get_state(&self) -> CredentialState {
        self.state
    }

    pub fn get_protocol_version(&self) -> String {
        self.protocol_version.to_owned()
    }

    pub fn get_auto_accept_credential(&self) -> Option<AutoAcceptCredential> {
        self.auto_accept_credential
    }

    pub fn get_credential_attributes(&self) -> Option<Vec<CredentialPreviewAttribute>> {
        self.credential_attributes.to_owned()
    }

    pub fn get_credential_definition_id(&self) -> Option<String> {
        self.credential_definition_id.to_owned()
    }

    pub fn get_credentials(&self) -> Vec<CredentialRecordBinding> {
        self.credentials.to_owned()
    }

    pub fn get_error_message(&self) -> Option<String> {
        self.error_message.to_owned()
    }

    pub fn assert_state(&self, expected: &[CredentialState]) -> Result<(), AgentError> {
        self.state.assert_in(expected)
    }

    pub fn assert_protocol_version(&self, expected: &str) -> Result<(), AgentError> {
        assert_protocol_version(&self.protocol_version, expected)
    }
}

impl ToJSON for CredentialExchangeRecord {
    fn to_json(&self) -> Result<String, BaseError> {
        serde_json::to_string(self).map_err(|err| BaseError::ToJSONError(err.to_string()))
    }
}

impl TryFrom<Vec<u8>> for CredentialExchangeRecord {
    type Error = BaseError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        serde_json::from_slice(&value).map_err(|err| BaseError::ToJSONError(err.to_string()))
    }
}

impl RecordAccessor for CredentialExchangeRecord {
    const RECORD_TYPE: &'static str = "CredentialRecord";

    fn get_id(&self) -> String {
        self.id.to_owned()
    }

    fn get_tags(&self) -> Tags {
        let mut tags = Tags::new();
        tags.insert(TAG_THREAD_ID.to_string(), self.thread_id.to_owned());
        tags.insert(TAG_CONNECTION_ID.to_string(), self.connection_id.to_owned());
        tags.insert(TAG_STATE.to_string(), self.state.as_str().to_string());

        if !self.credentials.is_empty() {
            let ids: Vec<String> = self
                .credentials
                .iter()
                .map(|binding| binding.credential_record_id.to_owned())
                .collect();
            tags.insert(TAG_CREDENTIAL_IDS.to_string(), ids.join(","));
        }

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
