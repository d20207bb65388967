use std::fmt::Display;

use super::types::AgentError;

/// `ExchangeState` is implemented by the state enum of every protocol
pub trait ExchangeState: Copy + PartialEq + Display {
    fn can_transition_to(&self, next: &Self) -> bool;

    fn assert_transition(&self, next: Self) -> Result<(), AgentError> {
        if !self.can_transition_to(&next) {
            return Err(AgentError::InvalidStateTransition {
                from: self.to_string(),
                to: next.to_string(),
            });
        }

        Ok(())
    }

    /// `assert_in` fails unless the current state is one of `expected`
    fn assert_in(&self, expected: &[Self]) -> Result<(), AgentError> {
        if expected.contains(self) {
            return Ok(());
        }

        let names: Vec<String> = expected.iter().map(|state| state.to_string()).collect();
        Err(AgentError::InvalidState {
            expected: names.join("|"),
            actual: self.to_string(),
        })
    }
}

pub fn assert_protocol_version(actual: &str, expected: &str) -> Result<(), AgentError> {
    if actual != expected {
        return Err(AgentError::InvalidProtocolVersion(format!(
            "expected {}, got {}",
            expected, actual
        )));
    }

    Ok(())
}
