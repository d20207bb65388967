//! `prople-aries-agent` assembles the protocol services of `prople-aries-core` into a
//! configurable DIDComm agent
//!
//! The host provides the collaborators (storage, wallet, ledger, revocation, transport), feeds
//! every decrypted inbound message to [`Agent::receive_message`] and drives the exchanges through
//! the command modules.
pub mod common;
pub mod config;
pub mod logging;
pub mod modules;

mod agent;
pub use agent::{Agent, Collaborators, DecryptedMessage};

#[cfg(test)]
mod testutil;
