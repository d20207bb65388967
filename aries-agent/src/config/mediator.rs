use rst_common::standard::serde::{self, Deserialize};

use prople_aries_core::connection::messages::ConnectionInvitationMessage;
use prople_aries_core::routing::PickupStrategy;

use crate::common::types::{CommonError, ToValidate};

const DEFAULT_PICKUP_INTERVAL_SECS: u64 = 5;

fn default_pickup_interval() -> u64 {
    DEFAULT_PICKUP_INTERVAL_SECS
}

/// `MediatorOptions` is the `[mediator]` section
///
/// Without `invitation_url` the agent starts without a mediator and one can still be
/// provisioned later through the mediation module.
#[derive(Deserialize, Debug, Clone)]
#[serde(crate = "self::serde")]
pub struct MediatorOptions {
    #[serde(default)]
    pub(super) invitation_url: Option<String>,

    #[serde(default)]
    pub(super) pickup_strategy: PickupStrategy,

    #[serde(default = "default_pickup_interval")]
    pub(super) pickup_interval_secs: u64,
}

impl MediatorOptions {
    pub fn get_invitation_url(&self) -> Option<String> {
        self.invitation_url.to_owned()
    }

    pub fn get_pickup_strategy(&self) -> PickupStrategy {
        self.pickup_strategy
    }

    pub fn get_pickup_interval_secs(&self) -> u64 {
        self.pickup_interval_secs
    }
}

impl Default for MediatorOptions {
    fn default() -> Self {
        Self {
            invitation_url: None,
            pickup_strategy: PickupStrategy::None,
            pickup_interval_secs: DEFAULT_PICKUP_INTERVAL_SECS,
        }
    }
}

impl ToValidate for MediatorOptions {
    fn validate(&self) -> Result<(), CommonError> {
        if let Some(url) = &self.invitation_url {
            ConnectionInvitationMessage::from_url(url).map_err(|_| {
                CommonError::ValidationError(
                    "config: mediator:invitation_url is invalid".to_string(),
                )
            })?;
        }

        if self.pickup_strategy == PickupStrategy::PickupV1 && self.pickup_interval_secs == 0 {
            return Err(CommonError::ValidationError(
                "config: mediator:pickup_interval_secs is missing".to_string(),
            ));
        }

        Ok(())
    }
}
