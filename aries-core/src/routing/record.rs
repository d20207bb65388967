use rst_common::standard::chrono::serde::{ts_seconds, ts_seconds_option};
use rst_common::standard::chrono::{DateTime, Utc};
use rst_common::standard::serde::{self, Deserialize, Serialize};
use rst_common::standard::serde_json;

use rstdev_domain::entity::ToJSON;
use rstdev_domain::BaseError;

use crate::agent::message::generate_id;
use crate::storage::types::{
    timestamp_now, RecordAccessor, Tags, TAG_CONNECTION_ID, TAG_ROLE, TAG_STATE, TAG_THREAD_ID,
};

use super::types::{MediationRole, MediationState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct MediationRecord {
    pub(crate) id: String,
    pub(crate) connection_id: String,
    pub(crate) thread_id: String,
    pub(crate) state: MediationState,
    pub(crate) role: MediationRole,
    pub(crate) endpoint: Option<String>,
    pub(crate) routing_keys: Vec<String>,
    pub(crate) recipient_keys: Vec<String>,

    #[serde(with = "ts_seconds")]
    pub(crate) created_at: DateTime<Utc>,

    #[serde(with = "ts_seconds_option")]
    pub(crate) updated_at: Option<DateTime<Utc>>,
}

impl MediationRecord {
    pub fn new(connection_id: String, thread_id: String, role: MediationRole) -> Self {
        Self {
            id: generate_id(),
            connection_id,
            thread_id,
            state: MediationState::Requested,
            role,
            endpoint: None,
            routing_keys: Vec::new(),
            recipient_keys: Vec::new(),
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

    pub fn get_state(&self) -> MediationState {
        self.state
    }

    pub fn get_role(&self) -> MediationRole {
        self.role
    }

    pub fn get_endpoint(&self) -> Option<String> {
        self.endpoint.to_owned()
    }

    pub fn get_routing_keys(&self) -> Vec<String> {
        self.routing_keys.to_owned()
    }

    pub fn get_recipient_keys(&self) -> Vec<String> {
        self.recipient_keys.to_owned()
    }

    pub fn is_ready(&self) -> bool {
        self.state == MediationState::Granted
    }
}

impl ToJSON for MediationRecord {
    fn to_json(&self) -> Result<String, BaseError> {
        serde_json::to_string(self).map_err(|err| BaseError::ToJSONError(err.to_string()))
    }
}

impl TryFrom<Vec<u8>> for MediationRecord {
    type Error = BaseError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        serde_json::from_slice(&value).map_err(|err| BaseError::ToJSONError(err.to_string()))
    }
}

impl RecordAccessor for MediationRecord {
    const RECORD_TYPE: &'static str = "MediationRecord";

    fn get_id(&self) -> String {
        self.id.to_owned()
    }

    fn get_tags(&self) -> Tags {
        let mut tags = Tags::new();
        tags.insert(TAG_CONNECTION_ID.to_string(), self.connection_id.to_owned());
        tags.insert(TAG_THREAD_ID.to_string(), self.thread_id.to_owned());
        tags.insert(TAG_STATE.to_string(), self.state.as_str().to_string());
        tags.insert(TAG_ROLE.to_string(), self.role.as_str().to_string());
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
