//! `proofs` runs the present proof protocol for provers and verifiers
pub mod handlers;
pub mod messages;
pub mod types;

mod record;
pub use record::ProofExchangeRecord;

mod service;
pub use service::ProofService;

pub use types::{AutoAcceptProof, ProofState};
