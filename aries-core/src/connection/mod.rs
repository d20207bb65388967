//! `connection` establishes the pairwise channel every other protocol runs over
pub mod handlers;
pub mod messages;
pub mod types;

mod record;
pub use record::ConnectionRecord;

mod service;
pub use service::ConnectionService;

pub use types::{ConnectionRole, ConnectionState};
