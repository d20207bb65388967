use rst_common::standard::chrono::serde::{ts_seconds, ts_seconds_option};
use rst_common::standard::chrono::{DateTime, Utc};
use rst_common::standard::serde::{self, Deserialize, Serialize};
use rst_common::standard::serde_json;

use rstdev_domain::entity::ToJSON;
use rstdev_domain::BaseError;

use crate::agent::message::generate_id;
use crate::storage::types::{
    timestamp_now, RecordAccessor, Tags, TAG_ROLE, TAG_STATE, TAG_THREAD_ID,
};

use super::messages::{ConnectionInvitationMessage, DidDoc};
use super::types::{
    ConnectionRole, ConnectionState, TAG_DID, TAG_INVITATION_KEY, TAG_THEIR_DID, TAG_THEIR_KEY,
    TAG_VERKEY,
};

/// `ConnectionRecord` is the local view of a pairwise channel
///
/// `did` and `verkey` are ours, generated by the wallet when the record is created. The `their_*`
/// fields are filled in from the peer's request or response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct ConnectionRecord {
    pub(crate) id: String,
    pub(crate) state: ConnectionState,
    pub(crate) role: ConnectionRole,
    pub(crate) did: String,
    pub(crate) verkey: String,
    pub(crate) their_did: Option<String>,
    pub(crate) their_key: Option<String>,
    pub(crate) their_label: Option<String>,
    pub(crate) their_did_doc: Option<DidDoc>,
    pub(crate) invitation: Option<ConnectionInvitationMessage>,
    pub(crate) thread_id: Option<String>,
    pub(crate) auto_accept_connection: Option<bool>,
    pub(crate) alias: Option<String>,

    #[serde(with = "ts_seconds")]
    pub(crate) created_at: DateTime<Utc>,

    #[serde(with = "ts_seconds_option")]
    pub(crate) updated_at: Option<DateTime<Utc>>,
}

impl ConnectionRecord {
    pub fn new(role: ConnectionRole, did: String, verkey: String) -> Self {
        Self {
            id: generate_id(),
            state: ConnectionState::Invited,
            role,
            did,
            verkey,
            their_did: None,
            their_key: None,
            their_label: None,
            their_did_doc: None,
            invitation: None,
            thread_id: None,
            auto_accept_connection: None,
            alias: None,
            created_at: timestamp_now(),
            updated_at: None,
        }
    }

    pub fn get_id(&self) -> String {
        self.id.to_owned()
    }

    pub fn get_state(&self) -> ConnectionState {
        self.state
    }

    pub fn get_role(&self) -> ConnectionRole {
        self.role
    }

    pub fn get_did(&self) -> String {
        self.did.to_owned()
    }

    pub fn get_verkey(&self) -> String {
        self.verkey.to_owned()
    }

    pub fn get_their_did(&self) -> Option<String> {
        self.their_did.to_owned()
    }

    pub fn get_their_key(&self) -> Option<String> {
        self.their_key.to_owned()
    }

    pub fn get_their_label(&self) -> Option<String> {
        self.their_label.to_owned()
    }

    pub fn get_their_did_doc(&self) -> Option<&DidDoc> {
        self.their_did_doc.as_ref()
    }

    pub fn get_invitation(&self) -> Option<&ConnectionInvitationMessage> {
        self.invitation.as_ref()
    }

    pub fn get_thread_id(&self) -> Option<String> {
        self.thread_id.to_owned()
    }

    pub fn get_auto_accept_connection(&self) -> Option<bool> {
        self.auto_accept_connection
    }

    pub fn get_alias(&self) -> Option<String> {
        self.alias.to_owned()
    }

    /// `get_invitation_key` is the first recipient key of the invitation that started the
    /// connection
    pub fn get_invitation_key(&self) -> Option<String> {
        self.invitation
            .as_ref()
            .and_then(|invitation| invitation.recipient_keys.first().cloned())
    }

    /// `get_their_endpoint` prefers the peer's DID document over the invitation
    pub fn get_their_endpoint(&self) -> Option<String> {
        self.their_did_doc
            .as_ref()
            .and_then(|doc| doc.service_endpoint())
            .or_else(|| {
                self.invitation
                    .as_ref()
                    .and_then(|invitation| invitation.service_endpoint.to_owned())
            })
    }

    pub fn is_ready(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Responded | ConnectionState::Complete
        )
    }
}

impl ToJSON for ConnectionRecord {
    fn to_json(&self) -> Result<String, BaseError> {
        serde_json::to_string(self).map_err(|err| BaseError::ToJSONError(err.to_string()))
    }
}

impl TryFrom<Vec<u8>> for ConnectionRecord {
    type Error = BaseError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        serde_json::from_slice(&value).map_err(|err| BaseError::ToJSONError(err.to_string()))
    }
}

impl RecordAccessor for ConnectionRecord {
    const RECORD_TYPE: &'static str = "ConnectionRecord";

    fn get_id(&self) -> String {
        self.id.to_owned()
    }

    fn get_tags(&self) -> Tags {
        let mut tags = Tags::new();
        tags.insert(TAG_STATE.to_string(), self.state.as_str().to_string());
        tags.insert(TAG_ROLE.to_string(), self.role.as_str().to_string());
        tags.insert(TAG_DID.to_string(), self.did.to_owned());
        tags.insert(TAG_VERKEY.to_string(), self.verkey.to_owned());

        let optionals = [
            (TAG_THEIR_DID, self.their_did.to_owned()),
            (TAG_THEIR_KEY, self.their_key.to_owned()),
            (TAG_THREAD_ID, self.thread_id.to_owned()),
            (TAG_INVITATION_KEY, self.get_invitation_key()),
        ];

        for (key, value) in optionals {
            if let Some(val) = value {
                tags.insert(key.to_string(), val);
            }
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
