use std::marker::PhantomData;
use std::sync::Arc;

use rst_common::standard::serde_json;
use rst_common::with_logging::log::debug;

use super::types::{RecordAccessor, StorageBuilder, StorageError, StoredRecord, TagQuery};

/// `Repository` persists one record type through the wallet storage
///
/// The repository is the only component allowed to compute and write tags. Every method maps to
/// a single storage call except the single-result queries which additionally check the result
/// cardinality.
pub struct Repository<T: RecordAccessor> {
    storage: Arc<dyn StorageBuilder>,
    _phantom: PhantomData<T>,
}

impl<T: RecordAccessor> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<T: RecordAccessor> Repository<T> {
    pub fn new(storage: Arc<dyn StorageBuilder>) -> Self {
        Self {
            storage,
            _phantom: PhantomData,
        }
    }

    fn to_stored(record: &T) -> Result<StoredRecord, StorageError> {
        let value = record
            .to_json()
            .map_err(|err| StorageError::SerializeError(err.to_string()))?;

        Ok(StoredRecord {
            record_type: T::RECORD_TYPE.to_string(),
            id: record.get_id(),
            value: value.into_bytes(),
            tags: record.get_tags(),
        })
    }

    fn from_stored(stored: StoredRecord) -> Result<T, StorageError> {
        serde_json::from_slice::<T>(&stored.value)
            .map_err(|err| StorageError::UnserializeError(err.to_string()))
    }

    pub async fn save(&self, record: &T) -> Result<(), StorageError> {
        let stored = Self::to_stored(record)?;
        debug!("storage: saving {}:{}", T::RECORD_TYPE, stored.id);

        self.storage.add(stored).await
    }

    /// `update` refreshes `updated_at` and recomputes the tags before overwriting
    pub async fn update(&self, record: &mut T) -> Result<(), StorageError> {
        record.touch();

        let stored = Self::to_stored(record)?;
        debug!("storage: updating {}:{}", T::RECORD_TYPE, stored.id);

        self.storage.update(stored).await
    }

    pub async fn delete(&self, record: &T) -> Result<(), StorageError> {
        self.delete_by_id(&record.get_id()).await
    }

    pub async fn delete_by_id(&self, id: &str) -> Result<(), StorageError> {
        debug!("storage: deleting {}:{}", T::RECORD_TYPE, id);
        self.storage
            .delete(T::RECORD_TYPE.to_string(), id.to_string())
            .await
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<T>, StorageError> {
        let stored = self
            .storage
            .get(T::RECORD_TYPE.to_string(), id.to_string())
            .await?;

        stored.map(Self::from_stored).transpose()
    }

    pub async fn get_by_id(&self, id: &str) -> Result<T, StorageError> {
        self.find_by_id(id).await?.ok_or_else(|| {
            StorageError::RecordNotFound(format!("{} with id {}", T::RECORD_TYPE, id))
        })
    }

    pub async fn get_all(&self) -> Result<Vec<T>, StorageError> {
        self.find_by_query(TagQuery::new()).await
    }

    pub async fn find_by_query(&self, query: TagQuery) -> Result<Vec<T>, StorageError> {
        self.storage
            .search(T::RECORD_TYPE.to_string(), query)
            .await?
            .into_iter()
            .map(Self::from_stored)
            .collect()
    }

    /// `find_single_by_query` returns `None` when nothing matches and fails when more than one
    /// record matches
    pub async fn find_single_by_query(&self, query: TagQuery) -> Result<Option<T>, StorageError> {
        let mut records = self.find_by_query(query.clone()).await?;
        match records.len() {
            0 => Ok(None),
            1 => Ok(records.pop()),
            count => Err(StorageError::AmbiguousQuery {
                record_type: T::RECORD_TYPE.to_string(),
                query: query.to_string(),
                count,
            }),
        }
    }

    pub async fn get_single_by_query(&self, query: TagQuery) -> Result<T, StorageError> {
        let display = query.to_string();
        self.find_single_by_query(query).await?.ok_or_else(|| {
            StorageError::RecordNotFound(format!("{} matching {}", T::RECORD_TYPE, display))
        })
    }
}
