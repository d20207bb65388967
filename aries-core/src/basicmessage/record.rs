use rst_common::standard::chrono::serde::{ts_seconds, ts_seconds_option};
use rst_common::standard::chrono::{DateTime, Utc};
use rst_common::standard::serde::{self, Deserialize, Serialize};
use rst_common::standard::serde_json;

use rstdev_domain::entity::ToJSON;
use rstdev_domain::BaseError;

use crate::agent::message::{generate_id, DidCommMessage};
use crate::storage::types::{
    timestamp_now, RecordAccessor, Tags, TAG_CONNECTION_ID, TAG_ROLE, TAG_THREAD_ID,
};

use super::messages::BasicMessage;

const TAG_PARENT_THREAD_ID: &str = "parent_thread_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "self::serde", rename_all = "snake_case")]
pub enum BasicMessageRole {
    Sender,
    Receiver,
}

impl BasicMessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            BasicMessageRole::Sender => "sender",
            BasicMessageRole::Receiver => "receiver",
        }
    }
}

/// `BasicMessageRecord` keeps one message, it never changes after creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct BasicMessageRecord {
    pub(crate) id: String,
    pub(crate) connection_id: String,
    pub(crate) role: BasicMessageRole,
    pub(crate) thread_id: String,
    pub(crate) parent_thread_id: Option<String>,
    pub(crate) content: String,
    pub(crate) sent_time: DateTime<Utc>,

    #[serde(with = "ts_seconds")]
    pub(crate) created_at: DateTime<Utc>,

    #[serde(with = "ts_seconds_option")]
    pub(crate) updated_at: Option<DateTime<Utc>>,
}

impl BasicMessageRecord {
    pub fn new(connection_id: String, role: BasicMessageRole, message: &BasicMessage) -> Self {
        Self {
            id: generate_id(),
            connection_id,
            role,
            thread_id: message.get_thread_id(),
            parent_thread_id: message.get_parent_thread_id(),
            content: message.content.to_owned(),
            sent_time: message.sent_time,
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

    pub fn get_role(&self) -> BasicMessageRole {
        self.role
    }

    pub fn get_thread_id(&self) -> String {
        self.thread_id.to_owned()
    }

    pub fn get_parent_thread_id(&self) -> Option<String> {
        self.parent_thread_id.to_owned()
    }

    pub fn get_content(&self) -> String {
        self.content.to_owned()
    }

    pub fn get_sent_time(&self) -> DateTime<Utc> {
        self.sent_time
    }
}

impl ToJSON for BasicMessageRecord {
    fn to_json(&self) -> Result<String, BaseError> {
        serde_json::to_string(self).map_err(|err| BaseError::ToJSONError(err.to_string()))
    }
}

impl TryFrom<Vec<u8>> for BasicMessageRecord {
    type Error = BaseError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        serde_json::from_slice(&value).map_err(|err| BaseError::ToJSONError(err.to_string()))
    }
}

impl RecordAccessor for BasicMessageRecord {
    const RECORD_TYPE: &'static str = "BasicMessageRecord";

    fn get_id(&self) -> String {
        self.id.to_owned()
    }

    fn get_tags(&self) -> Tags {
        let mut tags = Tags::new();
        tags.insert(TAG_CONNECTION_ID.to_string(), self.connection_id.to_owned());
        tags.insert(TAG_ROLE.to_string(), self.role.as_str().to_string());
        tags.insert(TAG_THREAD_ID.to_string(), self.thread_id.to_owned());

        if let Some(parent) = &self.parent_thread_id {
            tags.insert(TAG_PARENT_THREAD_ID.to_string(), parent.to_owned());
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags() {
        let message = BasicMessage::new("hello".to_string())
            .with_parent_thread(Some("parent-1".to_string()));
        let record = BasicMessageRecord::new("conn-1".to_string(), BasicMessageRole::Receiver, &message);

        let tags = record.get_tags();
        assert_eq!(tags.get(TAG_CONNECTION_ID), Some(&"conn-1".to_string()));
        assert_eq!(tags.get(TAG_ROLE), Some(&"receiver".to_string()));
        assert_eq!(tags.get(TAG_THREAD_ID), Some(&message.id));
        assert_eq!(tags.get(TAG_PARENT_THREAD_ID), Some(&"parent-1".to_string()))
    }
}
