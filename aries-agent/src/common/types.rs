use rst_common::with_errors::thiserror::{self, Error};

use prople_aries_core::agent::AgentError;

#[derive(Debug, PartialEq, Error)]
pub enum CommonError {
    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("agent error: {0}")]
    AgentError(#[from] AgentError),
}

pub trait ToValidate {
    fn validate(&self) -> Result<(), CommonError>;
}
