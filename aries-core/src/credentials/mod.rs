//! `credentials` runs the issue credential protocol for both issuers and holders
pub mod handlers;
pub mod messages;
pub mod types;

mod record;
pub use record::CredentialExchangeRecord;

mod service;
pub use service::CredentialService;

pub use types::{AutoAcceptCredential, CredentialState};
