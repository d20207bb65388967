//! `storage` is the record store of the agent
//!
//! Every protocol owns one record type implementing [`types::RecordAccessor`]. Records are
//! persisted through a [`Repository`] which is generic over the record type and backed by the
//! wallet storage collaborator, [`types::StorageBuilder`].
//!
//! Lookups other than by id go through tags. Each record computes its own tag set from its
//! current field values, and the repository recomputes it on every save and update, so a tag
//! query always reflects the latest persisted state.
pub mod types;

mod repository;
pub use repository::Repository;

mod memory;
pub use memory::InMemoryStorage;

mod didcomm_message;
pub use didcomm_message::{DidCommMessageRecord, DidCommMessageRepository, DidCommMessageRole};
