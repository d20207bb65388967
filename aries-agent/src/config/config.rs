use rst_common::standard::serde::{self, Deserialize};

use crate::common::types::{CommonError, ToValidate};

use super::{AgentOptions, EventsOptions, MediatorOptions};

#[derive(Deserialize, Debug, Clone)]
#[serde(crate = "self::serde")]
pub struct Config {
    pub(super) agent: AgentOptions,

    #[serde(default)]
    pub(super) mediator: MediatorOptions,

    #[serde(default)]
    pub(super) events: EventsOptions,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_agent(mut self, agent: AgentOptions) -> Self {
        self.agent = agent;
        self
    }

    pub fn agent(&self) -> &AgentOptions {
        &self.agent
    }

    pub fn mediator(&self) -> &MediatorOptions {
        &self.mediator
    }

    pub fn events(&self) -> &EventsOptions {
        &self.events
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            agent: AgentOptions::default(),
            mediator: MediatorOptions::default(),
            events: EventsOptions::default(),
        }
    }
}

impl ToValidate for Config {
    fn validate(&self) -> Result<(), CommonError> {
        _ = self.agent.validate()?;
        _ = self.mediator.validate()?;
        _ = self.events.validate()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::helpers;
    use crate::common::types::CommonError;

    #[test]
    fn test_default_is_valid() {
        let cfg = Config::default();
        assert!(helpers::validate(cfg).is_ok())
    }

    #[test]
    fn test_validation_failed() {
        let cfg = Config::new().with_agent(AgentOptions::new(""));
        let validation = helpers::validate(cfg);
        assert!(validation.is_err());
        assert!(matches!(
            validation.unwrap_err(),
            CommonError::ValidationError(_)
        ))
    }
}
