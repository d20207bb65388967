use rst_common::standard::serde::{self, Deserialize};

use prople_aries_core::agent::events::DEFAULT_EVENT_CAPACITY;

use crate::common::types::{CommonError, ToValidate};

#[derive(Deserialize, Debug, Clone)]
#[serde(crate = "self::serde")]
pub struct EventsOptions {
    pub(super) capacity: usize,
}

impl EventsOptions {
    pub fn get_capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventsOptions {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl ToValidate for EventsOptions {
    fn validate(&self) -> Result<(), CommonError> {
        if self.capacity == 0 {
            return Err(CommonError::ValidationError(
                "config: events:capacity is missing".to_string(),
            ));
        }

        Ok(())
    }
}
