use rstdev_config::format::use_toml;
use rstdev_config::parser::from_file;
use rstdev_config::{types::ConfigError, Builder};

use super::Config;

pub struct Parser {
    conf_file: String,
}

impl Parser {
    pub fn new(conf_file: String) -> Self {
        Self { conf_file }
    }

    pub fn parse(&self) -> Result<Config, ConfigError> {
        let config_toml = {
            let config_builder: Result<Config, ConfigError> =
                Builder::new(from_file(self.conf_file.to_owned()))
                    .fetch()?
                    .parse(use_toml);

            config_builder
        };

        config_toml
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::path::PathBuf;

    use prople_aries_core::credentials::AutoAcceptCredential;
    use prople_aries_core::proofs::AutoAcceptProof;
    use prople_aries_core::routing::PickupStrategy;

    use crate::common::helpers;

    fn fixture(name: &str) -> String {
        let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        path.push("src/config/fixtures");
        format!("{}/{}", path.display(), name)
    }

    #[test]
    fn test_parse_config() {
        let parser = Parser::new(fixture("config.toml"));
        let config_builder = parser.parse();

        assert!(!config_builder.is_err());

        let config = config_builder.unwrap();
        let config_agent = config.agent();
        assert_eq!(config_agent.get_label(), "faber".to_string());
        assert!(config_agent.get_auto_accept_connections());
        assert_eq!(
            config_agent.get_auto_accept_credential(),
            AutoAcceptCredential::ContentApproved
        );
        assert_eq!(config_agent.get_auto_accept_proof(), AutoAcceptProof::Always);
        assert_eq!(
            config_agent.get_endpoint(),
            Some("https://faber.example.com/didcomm".to_string())
        );

        let config_mediator = config.mediator();
        assert_eq!(config_mediator.get_pickup_strategy(), PickupStrategy::PickupV1);
        assert_eq!(config_mediator.get_pickup_interval_secs(), 30);
        assert_eq!(config.events().get_capacity(), 512);

        assert!(helpers::validate(config).is_ok())
    }

    #[test]
    fn test_parse_minimal_config() {
        let parser = Parser::new(fixture("config_minimal.toml"));
        let config = parser.parse().unwrap();

        assert_eq!(config.agent().get_label(), "acme".to_string());
        assert!(config.mediator().get_invitation_url().is_none());
        assert_eq!(config.mediator().get_pickup_strategy(), PickupStrategy::None);
        assert!(helpers::validate(config).is_ok())
    }

    #[test]
    fn test_parse_missing_file() {
        let parser = Parser::new(fixture("unknown.toml"));
        assert!(parser.parse().is_err())
    }
}
