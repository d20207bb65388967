//! `routing` keeps the recipient side of mediation: asking a mediator for an endpoint,
//! registering recipient keys and picking up queued messages
pub mod handlers;
pub mod messages;
pub mod types;

mod record;
pub use record::MediationRecord;

mod service;
pub use service::MediationService;

pub use types::{MediationRole, MediationState, PickupStrategy, Routing};
