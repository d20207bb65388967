//! `modules` are the command surfaces a host application calls
//!
//! Each module wraps one protocol service, resolves the connection of the exchange and hands
//! the produced message to the transport.
mod connections;
pub use connections::ConnectionsModule;

mod credentials;
pub use credentials::CredentialsModule;

mod proofs;
pub use proofs::ProofsModule;

mod basic_messages;
pub use basic_messages::BasicMessagesModule;

mod mediation;
pub use mediation::{MediationModule, PICKUP_BATCH_SIZE};
