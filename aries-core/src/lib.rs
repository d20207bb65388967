//! `prople-aries-core` is the protocol exchange engine of a `DIDComm` agent.
//!
//! Two agents establish a pairwise channel through the `connection` protocol and then run
//! sub-protocols over it: `credentials` (issue credential), `proofs` (present proof),
//! `basicmessage` (free text) and `routing` (mediation and message pickup).
//!
//! Every protocol instantiates the same pattern:
//!
//! - An exchange record persisted through the generic [`storage::Repository`]
//! - A finite state machine that only moves forward (or to `Abandoned`)
//! - Thread based correlation of the wire messages
//! - A snapshot of the record published on the [`agent::EventBus`] for every transition
//!
//! Inbound messages are decoded by the [`agent::MessageRegistry`] into the closed
//! [`agent::AgentMessage`] enum and routed by the [`agent::Dispatcher`] to the handler
//! registered for their type. Anything that crosses an I/O boundary the engine does not own
//! (wallet crypto, ledger reads, envelope encryption and delivery) is consumed through the
//! collaborator traits defined at [`agent::types`].
pub mod agent;
pub mod storage;

pub mod basicmessage;
pub mod connection;
pub mod credentials;
pub mod proofs;
pub mod routing;
