use std::collections::BTreeMap;
use std::sync::Arc;

use rst_common::standard::async_trait::async_trait;
use rst_common::with_tokio::tokio::sync::RwLock;

use super::types::{StorageBuilder, StorageError, StoredRecord, TagQuery};

type RecordKey = (String, String);

/// `InMemoryStorage` is a process local [`StorageBuilder`]
///
/// Records are keyed by `(record_type, id)` so search results come back ordered by id.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    records: Arc<RwLock<BTreeMap<RecordKey, StoredRecord>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBuilder for InMemoryStorage {
    async fn add(&self, record: StoredRecord) -> Result<(), StorageError> {
        let key = (record.record_type.to_owned(), record.id.to_owned());
        let mut records = self.records.write().await;

        if records.contains_key(&key) {
            return Err(StorageError::RecordDuplicate(format!(
                "{} with id {}",
                key.0, key.1
            )));
        }

        records.insert(key, record);
        Ok(())
    }

    async fn update(&self, record: StoredRecord) -> Result<(), StorageError> {
        let key = (record.record_type.to_owned(), record.id.to_owned());
        let mut records = self.records.write().await;

        match records.get_mut(&key) {
            Some(existing) => {
                *existing = record;
                Ok(())
            }
            None => Err(StorageError::RecordNotFound(format!(
                "{} with id {}",
                key.0, key.1
            ))),
        }
    }

    async fn delete(&self, record_type: String, id: String) -> Result<(), StorageError> {
        let mut records = self.records.write().await;
        records
            .remove(&(record_type.to_owned(), id.to_owned()))
            .map(|_| ())
            .ok_or_else(|| {
                StorageError::RecordNotFound(format!("{} with id {}", record_type, id))
            })
    }

    async fn get(
        &self,
        record_type: String,
        id: String,
    ) -> Result<Option<StoredRecord>, StorageError> {
        let records = self.records.read().await;
        Ok(records.get(&(record_type, id)).cloned())
    }

    async fn search(
        &self,
        record_type: String,
        query: TagQuery,
    ) -> Result<Vec<StoredRecord>, StorageError> {
        let records = self.records.read().await;
        let found = records
            .values()
            .filter(|record| record.record_type == record_type && query.matches(&record.tags))
            .cloned()
            .collect();

        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rst_common::with_tokio::tokio;

    use crate::storage::types::{Tags, TAG_STATE};

    fn build_record(record_type: &str, id: &str, state: &str) -> StoredRecord {
        let mut tags = Tags::new();
        tags.insert(TAG_STATE.to_string(), state.to_string());

        StoredRecord {
            record_type: record_type.to_string(),
            id: id.to_string(),
            value: b"{}".to_vec(),
            tags,
        }
    }

    #[tokio::test]
    async fn test_search_scoped_by_record_type() {
        let storage = InMemoryStorage::new();
        let _ = storage.add(build_record("A", "1", "done")).await;
        let _ = storage.add(build_record("B", "1", "done")).await;
        let _ = storage.add(build_record("A", "2", "sent")).await;

        let found = storage
            .search("A".to_string(), TagQuery::new().with(TAG_STATE, "done"))
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].record_type, "A".to_string());
        assert_eq!(found[0].id, "1".to_string())
    }

    #[tokio::test]
    async fn test_delete_missing() {
        let storage = InMemoryStorage::new();
        let deleted = storage.delete("A".to_string(), "1".to_string()).await;
        assert!(matches!(
            deleted.unwrap_err(),
            StorageError::RecordNotFound(_)
        ))
    }
}
