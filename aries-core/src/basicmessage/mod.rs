//! `basicmessage` exchanges free text between two connected agents
pub mod handlers;

mod messages;
pub use messages::BasicMessage;

mod record;
pub use record::{BasicMessageRecord, BasicMessageRole};

mod service;
pub use service::BasicMessageService;
