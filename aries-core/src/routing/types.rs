use std::fmt::{self, Display};

use rst_common::standard::serde::{self, Deserialize, Serialize};

use crate::agent::state::ExchangeState;

pub const PROTOCOL_NAME: &str = "coordinate-mediation";

/// `Routing` tells a peer where and through which keys to reach this agent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Routing {
    pub endpoint: Option<String>,
    pub routing_keys: Vec<String>,
    pub mediator_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "self::serde", rename_all = "snake_case")]
pub enum MediationState {
    Requested,
    Granted,
    Denied,
}

impl MediationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediationState::Requested => "requested",
            MediationState::Granted => "granted",
            MediationState::Denied => "denied",
        }
    }
}

impl Display for MediationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl ExchangeState for MediationState {
    fn can_transition_to(&self, next: &Self) -> bool {
        matches!(
            (self, next),
            (MediationState::Requested, MediationState::Granted)
                | (MediationState::Requested, MediationState::Denied)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "self::serde", rename_all = "snake_case")]
pub enum MediationRole {
    Recipient,
    Mediator,
}

impl MediationRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediationRole::Recipient => "recipient",
            MediationRole::Mediator => "mediator",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "self::serde", rename_all = "snake_case")]
pub enum KeylistUpdateAction {
    Add,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "self::serde", rename_all = "snake_case")]
pub enum KeylistUpdateResult {
    ClientError,
    ServerError,
    NoChange,
    Success,
}

/// `PickupStrategy` selects how queued messages are collected from the mediator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(crate = "self::serde", rename_all = "snake_case")]
pub enum PickupStrategy {
    #[default]
    None,
    Implicit,
    PickupV1,
}

#[cfg(test)]
mod tests {
    use super::*;
    use table_test::table_test;

    #[test]
    fn test_state_transitions() {
        use MediationState::*;

        let table = vec![
            ((Requested, Granted), true),
            ((Requested, Denied), true),
            ((Granted, Denied), false),
            ((Denied, Granted), false),
            ((Granted, Requested), false),
        ];

        for (validator, (from, to), expected) in table_test!(table) {
            validator
                .given(&format!("{} -> {}", from, to))
                .when("can_transition_to")
                .then(&format!("it should be {}", expected))
                .assert_eq(expected, from.can_transition_to(&to));
        }
    }
}
