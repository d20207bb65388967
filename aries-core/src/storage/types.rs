use std::collections::BTreeMap;
use std::fmt::{self, Debug, Display};

use rst_common::standard::async_trait::async_trait;
use rst_common::standard::chrono::{DateTime, SubsecRound, Utc};
use rst_common::standard::serde::de::DeserializeOwned;
use rst_common::standard::serde::Serialize;
use rst_common::with_errors::thiserror::{self, Error};

use rstdev_domain::entity::ToJSON;

pub const TAG_THREAD_ID: &str = "thread_id";
pub const TAG_CONNECTION_ID: &str = "connection_id";
pub const TAG_STATE: &str = "state";
pub const TAG_ROLE: &str = "role";

/// `Tags` is the derived key/value index of a record
pub type Tags = BTreeMap<String, String>;

/// `timestamp_now` is the current time at the whole second precision records are persisted with
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// `StorageError` is a base error types for the `storage` domain
#[derive(Debug, PartialEq, Error, Clone)]
pub enum StorageError {
    #[error("record already exists: {0}")]
    RecordDuplicate(String),

    #[error("record not found: {0}")]
    RecordNotFound(String),

    #[error("ambiguous query: {record_type} matched {count} records for {query}")]
    AmbiguousQuery {
        record_type: String,
        query: String,
        count: usize,
    },

    #[error("serialize error: {0}")]
    SerializeError(String),

    #[error("unserialize error: {0}")]
    UnserializeError(String),

    #[error("backend error: {0}")]
    BackendError(String),
}

/// `RecordAccessor` is a special trait used to access the base properties of persisted records
///
/// The `id` is generated once at creation and never changes. The `tags` must be a deterministic
/// function of the record's current field values, the repository never stores tags that were not
/// computed by this trait.
pub trait RecordAccessor:
    Clone + Debug + Serialize + DeserializeOwned + ToJSON + Send + Sync + 'static
{
    const RECORD_TYPE: &'static str;

    fn get_id(&self) -> String;
    fn get_tags(&self) -> Tags;
    fn get_created_at(&self) -> DateTime<Utc>;
    fn get_updated_at(&self) -> Option<DateTime<Utc>>;

    /// `touch` refreshes the `updated_at` timestamp, called by the repository on every update
    fn touch(&mut self);
}

/// `TagQuery` is an equality predicate over a record's tags
///
/// All conditions must match (conjunction). An empty query matches every record of the type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagQuery {
    conditions: BTreeMap<String, String>,
}

impl TagQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.conditions.insert(key.to_string(), value.into());
        self
    }

    /// `with_optional` only adds the condition when a value is given
    pub fn with_optional(self, key: &str, value: Option<String>) -> Self {
        match value {
            Some(val) => self.with(key, val),
            None => self,
        }
    }

    /// `thread_and_connection` builds the correlation query shared by every exchange protocol
    pub fn thread_and_connection(thread_id: &str, connection_id: Option<String>) -> Self {
        Self::new()
            .with(TAG_THREAD_ID, thread_id)
            .with_optional(TAG_CONNECTION_ID, connection_id)
    }

    pub fn matches(&self, tags: &Tags) -> bool {
        self.conditions
            .iter()
            .all(|(key, value)| tags.get(key).map(|given| given == value).unwrap_or(false))
    }
}

impl Display for TagQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let conditions: Vec<String> = self
            .conditions
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect();

        write!(f, "{{{}}}", conditions.join(", "))
    }
}

/// `StoredRecord` is the raw form of a record as seen by the storage backend
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub record_type: String,
    pub id: String,
    pub value: Vec<u8>,
    pub tags: Tags,
}

/// `StorageBuilder` is the secure wallet storage abstraction
///
/// Implementers must fail `add` when the `(record_type, id)` pair already exists and fail
/// `update` when it does not. Search results must reflect every completed write.
#[async_trait]
pub trait StorageBuilder: Send + Sync {
    async fn add(&self, record: StoredRecord) -> Result<(), StorageError>;
    async fn update(&self, record: StoredRecord) -> Result<(), StorageError>;
    async fn delete(&self, record_type: String, id: String) -> Result<(), StorageError>;
    async fn get(
        &self,
        record_type: String,
        id: String,
    ) -> Result<Option<StoredRecord>, StorageError>;
    async fn search(
        &self,
        record_type: String,
        query: TagQuery,
    ) -> Result<Vec<StoredRecord>, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use table_test::table_test;

    #[test]
    fn test_tag_query_matches() {
        let mut tags = Tags::new();
        tags.insert(TAG_THREAD_ID.to_string(), "thread-1".to_string());
        tags.insert(TAG_CONNECTION_ID.to_string(), "conn-1".to_string());

        let table = vec![
            (TagQuery::new(), true),
            (TagQuery::new().with(TAG_THREAD_ID, "thread-1"), true),
            (
                TagQuery::thread_and_connection("thread-1", Some("conn-1".to_string())),
                true,
            ),
            (TagQuery::thread_and_connection("thread-1", None), true),
            (
                TagQuery::thread_and_connection("thread-1", Some("conn-2".to_string())),
                false,
            ),
            (TagQuery::new().with(TAG_STATE, "done"), false),
        ];

        for (validator, query, expected) in table_test!(table) {
            let given = query.matches(&tags);

            validator
                .given(&format!("{}", query))
                .when("matches")
                .then(&format!("it should be {}", expected))
                .assert_eq(expected, given);
        }
    }

    #[test]
    fn test_tag_query_display() {
        let query = TagQuery::thread_and_connection("t", Some("c".to_string()));
        assert_eq!(query.to_string(), "{connection_id=c, thread_id=t}")
    }

    #[test]
    fn test_timestamp_now_whole_seconds() {
        let now = timestamp_now();
        assert_eq!(now.timestamp_subsec_nanos(), 0)
    }
}
