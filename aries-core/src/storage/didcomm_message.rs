use rst_common::standard::chrono::serde::{ts_seconds, ts_seconds_option};
use rst_common::standard::chrono::{DateTime, Utc};
use rst_common::standard::serde::{self, Deserialize, Serialize};
use rst_common::standard::serde_json::{self, Value};
use rst_common::standard::uuid::Uuid;

use rstdev_domain::entity::ToJSON;
use rstdev_domain::BaseError;

use crate::agent::message::{encode_message, DidCommMessage};

use super::types::{
    timestamp_now, RecordAccessor, StorageError, TagQuery, Tags, TAG_ROLE, TAG_THREAD_ID,
};
use super::Repository;

const TAG_ASSOCIATED_RECORD_ID: &str = "associated_record_id";
const TAG_MESSAGE_TYPE: &str = "message_type";
const TAG_MESSAGE_ID: &str = "message_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "self::serde", rename_all = "snake_case")]
pub enum DidCommMessageRole {
    Sender,
    Receiver,
}

impl DidCommMessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            DidCommMessageRole::Sender => "sender",
            DidCommMessageRole::Receiver => "receiver",
        }
    }
}

/// `DidCommMessageRecord` keeps a copy of an exchanged protocol message next to the exchange
/// record it belongs to
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct DidCommMessageRecord {
    pub(crate) id: String,
    pub(crate) message: Value,
    pub(crate) message_type: String,
    pub(crate) message_id: String,
    pub(crate) thread_id: String,
    pub(crate) role: DidCommMessageRole,
    pub(crate) associated_record_id: String,

    #[serde(with = "ts_seconds")]
    pub(crate) created_at: DateTime<Utc>,

    #[serde(with = "ts_seconds_option")]
    pub(crate) updated_at: Option<DateTime<Utc>>,
}

impl DidCommMessageRecord {
    pub fn get_message(&self) -> &Value {
        &self.message
    }

    pub fn get_message_type(&self) -> String {
        self.message_type.to_owned()
    }

    pub fn get_role(&self) -> DidCommMessageRole {
        self.role
    }
}

impl ToJSON for DidCommMessageRecord {
    fn to_json(&self) -> Result<String, BaseError> {
        serde_json::to_string(self).map_err(|err| BaseError::ToJSONError(err.to_string()))
    }
}

impl RecordAccessor for DidCommMessageRecord {
    const RECORD_TYPE: &'static str = "DidCommMessageRecord";

    fn get_id(&self) -> String {
        self.id.to_owned()
    }

    fn get_tags(&self) -> Tags {
        let mut tags = Tags::new();
        tags.insert(
            TAG_ASSOCIATED_RECORD_ID.to_string(),
            self.associated_record_id.to_owned(),
        );
        tags.insert(TAG_MESSAGE_TYPE.to_string(), self.message_type.to_owned());
        tags.insert(TAG_MESSAGE_ID.to_string(), self.message_id.to_owned());
        tags.insert(TAG_THREAD_ID.to_string(), self.thread_id.to_owned());
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

/// `DidCommMessageRepository` stores the protocol messages an exchange needs later on, for
/// example the credential offer the holder reads back when it builds its request
#[derive(Clone)]
pub struct DidCommMessageRepository {
    repo: Repository<DidCommMessageRecord>,
}

impl DidCommMessageRepository {
    pub fn new(repo: Repository<DidCommMessageRecord>) -> Self {
        Self { repo }
    }

    /// `save_agent_message` inserts the message or replaces the one of the same type already
    /// associated with the record
    pub async fn save_agent_message<T: DidCommMessage>(
        &self,
        role: DidCommMessageRole,
        message: &T,
        associated_record_id: &str,
    ) -> Result<(), StorageError> {
        let value =
            encode_message(message).map_err(|err| StorageError::SerializeError(err.to_string()))?;

        let existing = self
            .repo
            .find_single_by_query(Self::query::<T>(associated_record_id))
            .await?;

        match existing {
            Some(mut record) => {
                record.message = value;
                record.message_id = message.get_id();
                record.thread_id = message.get_thread_id();
                record.role = role;
                self.repo.update(&mut record).await
            }
            None => {
                let record = DidCommMessageRecord {
                    id: Uuid::new_v4().to_string(),
                    message: value,
                    message_type: T::MESSAGE_TYPE.to_string(),
                    message_id: message.get_id(),
                    thread_id: message.get_thread_id(),
                    role,
                    associated_record_id: associated_record_id.to_string(),
                    created_at: timestamp_now(),
                    updated_at: None,
                };

                self.repo.save(&record).await
            }
        }
    }

    pub async fn find_agent_message<T: DidCommMessage>(
        &self,
        associated_record_id: &str,
    ) -> Result<Option<T>, StorageError> {
        let record = self
            .repo
            .find_single_by_query(Self::query::<T>(associated_record_id))
            .await?;

        record
            .map(|rec| {
                serde_json::from_value::<T>(rec.message)
                    .map_err(|err| StorageError::UnserializeError(err.to_string()))
            })
            .transpose()
    }

    pub async fn get_agent_message<T: DidCommMessage>(
        &self,
        associated_record_id: &str,
    ) -> Result<T, StorageError> {
        self.find_agent_message::<T>(associated_record_id)
            .await?
            .ok_or_else(|| {
                StorageError::RecordNotFound(format!(
                    "{} associated with {}",
                    T::MESSAGE_TYPE,
                    associated_record_id
                ))
            })
    }

    fn query<T: DidCommMessage>(associated_record_id: &str) -> TagQuery {
        TagQuery::new()
            .with(TAG_ASSOCIATED_RECORD_ID, associated_record_id)
            .with(TAG_MESSAGE_TYPE, T::MESSAGE_TYPE)
    }
}
