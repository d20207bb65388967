//! `agent` holds the runtime shared by every protocol
//!
//! - `registry`: message type URI to typed message decoding
//! - `dispatcher`: message type to handler routing
//! - `events`: the in-process event bus
//! - `lock`: per exchange serialization of concurrent inbound messages
//! - `types`: errors and the collaborator traits (wallet, ledger, revocation, transport)
pub mod context;
pub mod dependencies;
pub mod dispatcher;
pub mod events;
pub mod lock;
pub mod message;
pub mod registry;
pub mod state;
pub mod types;

pub use context::{InboundMessageContext, OutboundMessage};
pub use dependencies::AgentDependencies;
pub use dispatcher::{Dispatcher, MessageHandler};
pub use events::{AgentEvent, EventBus, EventBusError, EventStream, Subscription};
pub use lock::{ExchangeKey, ExchangeLocks};
pub use registry::{AgentMessage, MessageRegistry};
pub use types::{AgentError, MessageError};

#[cfg(test)]
pub mod testutil;
