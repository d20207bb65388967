use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;

use mockall::mock;

use rst_common::standard::async_trait::async_trait;
use rst_common::standard::serde_json::Value;
use rst_common::standard::uuid::Uuid;

use prople_aries_core::agent::types::{
    AgentError, CredentialRequestOutput, DidInfo, LedgerBuilder, RevocationBuilder,
    TransportBuilder, WalletBuilder,
};
use prople_aries_core::agent::OutboundMessage;
use prople_aries_core::storage::InMemoryStorage;

use crate::Collaborators;

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

/// `collaborators` builds in-memory collaborators whose transport queues every outbound message
/// into the returned outbox
pub fn collaborators(prefix: &str) -> (Collaborators, Receiver<OutboundMessage>) {
    let prefix = prefix.to_string();

    let mut wallet = MockFakeWallet::new();
    wallet.expect_create_did().returning(move || {
        Ok(DidInfo {
            did: format!("did:{}:{}", prefix, Uuid::new_v4()),
            verkey: format!("{}-verkey-{}", prefix, Uuid::new_v4()),
        })
    });

    let (sender, outbox) = mpsc::channel();
    let mut transport = MockFakeTransport::new();
    transport.expect_send().returning(move |message| {
        sender
            .send(message)
            .map_err(|err| AgentError::TransportError(err.to_string()))
    });
    transport.expect_receive_packed().returning(|_| Ok(()));

    let collaborators = Collaborators {
        storage: Arc::new(InMemoryStorage::new()),
        wallet: Arc::new(wallet),
        ledger: Arc::new(MockFakeLedger::new()),
        revocation: Arc::new(MockFakeRevocation::new()),
        transport: Arc::new(transport),
    };

    (collaborators, outbox)
}
