use std::future::Future;
use std::sync::Arc;

use rst_common::with_logging::log::{debug, warn};
use rst_common::with_tokio::tokio;

use crate::storage::types::{RecordAccessor, StorageBuilder};
use crate::storage::{DidCommMessageRepository, Repository};

use super::events::EventBus;
use super::lock::ExchangeLocks;
use super::types::{AgentError, LedgerBuilder, RevocationBuilder, TransportBuilder, WalletBuilder};

/// `AgentDependencies` bundles the collaborators and the shared runtime pieces injected into
/// every protocol service
#[derive(Clone)]
pub struct AgentDependencies {
    pub storage: Arc<dyn StorageBuilder>,
    pub wallet: Arc<dyn WalletBuilder>,
    pub ledger: Arc<dyn LedgerBuilder>,
    pub revocation: Arc<dyn RevocationBuilder>,
    pub transport: Arc<dyn TransportBuilder>,
    pub events: EventBus,
    pub locks: ExchangeLocks,
}

impl AgentDependencies {
    pub fn repository<T: RecordAccessor>(&self) -> Repository<T> {
        Repository::new(self.storage.clone())
    }

    pub fn message_repository(&self) -> DidCommMessageRepository {
        DidCommMessageRepository::new(self.repository())
    }
}

/// `spawn_best_effort` runs a detached task whose failure is only logged
pub fn spawn_best_effort<F>(operation: &'static str, task: F)
where
    F: Future<Output = Result<(), AgentError>> + Send + 'static,
{
    tokio::spawn(async move {
        match task.await {
            Ok(_) => debug!("background: {} finished", operation),
            Err(err) => warn!("background: {} failed: {}", operation, err),
        }
    });
}
