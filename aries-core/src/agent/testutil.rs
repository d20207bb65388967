use std::sync::Arc;

use mockall::mock;

use rst_common::standard::async_trait::async_trait;
use rst_common::standard::serde_json::Value;
use rst_common::with_tokio::tokio;

use crate::connection::{ConnectionRecord, ConnectionRole, ConnectionState};
use crate::storage::types::{StorageBuilder, StorageError, StoredRecord, TagQuery};
use crate::storage::{InMemoryStorage, Repository};

use super::context::OutboundMessage;
use super::dependencies::AgentDependencies;
use super::events::EventBus;
use super::lock::ExchangeLocks;
use super::message::generate_id;
use super::types::{
    AgentError, CredentialRequestOutput, DidInfo, LedgerBuilder, RevocationBuilder,
    TransportBuilder, WalletBuilder,
};

mock!(
    pub FakeWallet{}

    #[async_trait]
    impl WalletBuilder for FakeWallet {
        async fn create_did(&self) -> Result<DidInfo, AgentError>;
        fn master_secret_id(&self) -> String;
        async fn create_credential_offer(&self, cred_def_id: String) -> Result<String, AgentError>;
        async fn create_credential_request(&self, holder_did: String, offer_json: String, cred_def_json: String, master_secret_id: String) -> Result<CredentialRequestOutput, AgentError>;
        async fn create_credential(&self, offer_json: String, request_json: String, values_json: String) -> Result<String, AgentError>;
        async fn store_credential(&self, request_metadata_json: String, credential_json: String, cred_def_json: String, rev_reg_def_json: Option<String>) -> Result<String, AgentError>;
        async fn get_credential(&self, credential_id: String) -> Result<String, AgentError>;
        async fn get_credentials_for_proof_request(&self, proof_request_json: String) -> Result<String, AgentError>;
        async fn create_proof(&self, proof_request_json: String, requested_credentials_json: String, master_secret_id: String, schemas_json: String, cred_defs_json: String) -> Result<String, AgentError>;
        async fn verify_proof(&self, proof_request_json: String, proof_json: String, schemas_json: String, cred_defs_json: String) -> Result<bool, AgentError>;
    }
);

mock!(
    pub FakeLedger{}

    #[async_trait]
    impl LedgerBuilder for FakeLedger {
        async fn get_schema(&self, schema_id: String) -> Result<String, AgentError>;
        async fn get_credential_definition(&self, cred_def_id: String) -> Result<String, AgentError>;
        async fn get_revocation_registry_definition(&self, rev_reg_id: String) -> Result<String, AgentError>;
    }
);

mock!(
    pub FakeRevocation{}

    #[async_trait]
    impl RevocationBuilder for FakeRevocation {
        async fn download_tails(&self, rev_reg_def_json: String) -> Result<String, AgentError>;
    }
);

mock!(
    pub FakeTransport{}

    #[async_trait]
    impl TransportBuilder for FakeTransport {
        async fn send(&self, message: OutboundMessage) -> Result<(), AgentError>;
        async fn receive_packed(&self, packed: Value) -> Result<(), AgentError>;
    }
);

pub struct FakeCollaborators {
    pub wallet: MockFakeWallet,
    pub ledger: MockFakeLedger,
    pub revocation: MockFakeRevocation,
    pub transport: MockFakeTransport,
}

impl FakeCollaborators {
    pub fn new() -> Self {
        Self {
            wallet: MockFakeWallet::new(),
            ledger: MockFakeLedger::new(),
            revocation: MockFakeRevocation::new(),
            transport: MockFakeTransport::new(),
        }
    }

    /// `with_dids` prepares a wallet generating a fresh DID on every call
    pub fn with_dids(prefix: &str) -> Self {
        let mut fakes = Self::new();
        let prefix = prefix.to_string();

        fakes.wallet.expect_create_did().returning(move || {
            Ok(DidInfo {
                did: format!("did:{}:{}", prefix, generate_id()),
                verkey: format!("{}-verkey-{}", prefix, generate_id()),
            })
        });

        fakes
    }
}

/// `YieldingStorage` gives control back to the scheduler before every storage call, so
/// concurrent futures on a single threaded runtime interleave at each persistence step
#[derive(Clone, Default)]
pub struct YieldingStorage {
    inner: InMemoryStorage,
}

#[async_trait]
impl StorageBuilder for YieldingStorage {
    async fn add(&self, record: StoredRecord) -> Result<(), StorageError> {
        tokio::task::yield_now().await;
        self.inner.add(record).await
    }

    async fn update(&self, record: StoredRecord) -> Result<(), StorageError> {
        tokio::task::yield_now().await;
        self.inner.update(record).await
    }

    async fn delete(&self, record_type: String, id: String) -> Result<(), StorageError> {
        tokio::task::yield_now().await;
        self.inner.delete(record_type, id).await
    }

    async fn get(
        &self,
        record_type: String,
        id: String,
    ) -> Result<Option<StoredRecord>, StorageError> {
        tokio::task::yield_now().await;
        self.inner.get(record_type, id).await
    }

    async fn search(
        &self,
        record_type: String,
        query: TagQuery,
    ) -> Result<Vec<StoredRecord>, StorageError> {
        tokio::task::yield_now().await;
        self.inner.search(record_type, query).await
    }
}

pub fn build_dependencies(fakes: FakeCollaborators) -> AgentDependencies {
    build_dependencies_with_storage(fakes, Arc::new(InMemoryStorage::new()))
}

pub fn build_dependencies_with_storage(
    fakes: FakeCollaborators,
    storage: Arc<dyn StorageBuilder>,
) -> AgentDependencies {
    AgentDependencies {
        storage,
        wallet: Arc::new(fakes.wallet),
        ledger: Arc::new(fakes.ledger),
        revocation: Arc::new(fakes.revocation),
        transport: Arc::new(fakes.transport),
        events: EventBus::default(),
        locks: ExchangeLocks::new(),
    }
}

/// `save_ready_connection` stores a completed connection between `did` and `their_did`
pub async fn save_ready_connection(
    deps: &AgentDependencies,
    did: &str,
    their_did: &str,
) -> ConnectionRecord {
    let mut record = ConnectionRecord::new(
        ConnectionRole::Invitee,
        did.to_string(),
        format!("{}-verkey", did),
    );
    record.state = ConnectionState::Complete;
    record.their_did = Some(their_did.to_string());
    record.their_key = Some(format!("{}-verkey", their_did));

    let repo: Repository<ConnectionRecord> = deps.repository();
    let _ = repo.save(&record).await;
    record
}
