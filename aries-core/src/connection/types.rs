use std::fmt::{self, Display};

use rst_common::standard::serde::{self, Deserialize, Serialize};

use crate::agent::state::ExchangeState;
use crate::routing::Routing;

pub const PROTOCOL_NAME: &str = "connections";

pub const TAG_VERKEY: &str = "verkey";
pub const TAG_DID: &str = "did";
pub const TAG_THEIR_KEY: &str = "their_key";
pub const TAG_THEIR_DID: &str = "their_did";
pub const TAG_INVITATION_KEY: &str = "invitation_key";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "self::serde", rename_all = "snake_case")]
pub enum ConnectionState {
    Invited,
    Requested,
    Responded,
    Complete,
    Abandoned,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Invited => "invited",
            ConnectionState::Requested => "requested",
            ConnectionState::Responded => "responded",
            ConnectionState::Complete => "complete",
            ConnectionState::Abandoned => "abandoned",
        }
    }
}

impl Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl ExchangeState for ConnectionState {
    fn can_transition_to(&self, next: &Self) -> bool {
        use ConnectionState::*;

        matches!(
            (self, next),
            (Invited, Requested) | (Requested, Responded) | (Responded, Complete)
        ) || (*self != Abandoned && *next == Abandoned)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "self::serde", rename_all = "snake_case")]
pub enum ConnectionRole {
    Inviter,
    Invitee,
}

impl ConnectionRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionRole::Inviter => "inviter",
            ConnectionRole::Invitee => "invitee",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreateInvitationOptions {
    pub label: String,
    pub alias: Option<String>,
    pub image_url: Option<String>,
    pub auto_accept_connection: Option<bool>,
    pub routing: Routing,
}

#[derive(Debug, Clone, Default)]
pub struct ReceiveInvitationOptions {
    pub alias: Option<String>,
    pub auto_accept_connection: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct ConnectionRequestOptions {
    pub label: String,
    pub image_url: Option<String>,
    pub routing: Routing,
}

#[derive(Debug, Clone)]
pub struct TrustPingOptions {
    pub response_requested: bool,
    pub comment: Option<String>,
}

impl Default for TrustPingOptions {
    fn default() -> Self {
        Self {
            response_requested: true,
            comment: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use table_test::table_test;

    #[test]
    fn test_state_transitions() {
        use ConnectionState::*;

        let table = vec![
            ((Invited, Requested), true),
            ((Requested, Responded), true),
            ((Responded, Complete), true),
            ((Invited, Complete), false),
            ((Complete, Invited), false),
            ((Complete, Abandoned), true),
            ((Abandoned, Abandoned), false),
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
