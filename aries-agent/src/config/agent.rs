use rst_common::standard::serde::{self, Deserialize};

use prople_aries_core::credentials::AutoAcceptCredential;
use prople_aries_core::proofs::AutoAcceptProof;

use crate::common::types::{CommonError, ToValidate};

const ENDPOINT_SCHEMES: [&str; 4] = ["http://", "https://", "ws://", "wss://"];

/// `AgentOptions` is the `[agent]` section
#[derive(Deserialize, Debug, Clone)]
#[serde(crate = "self::serde")]
pub struct AgentOptions {
    pub(super) label: String,

    #[serde(default)]
    pub(super) auto_accept_connections: bool,

    #[serde(default)]
    pub(super) auto_accept_credential: AutoAcceptCredential,

    #[serde(default)]
    pub(super) auto_accept_proof: AutoAcceptProof,

    #[serde(default)]
    pub(super) endpoint: Option<String>,
}

impl AgentOptions {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            ..Default::default()
        }
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = Some(endpoint.to_string());
        self
    }

    pub fn with_auto_accept_connections(mut self, auto_accept: bool) -> Self {
        self.auto_accept_connections = auto_accept;
        self
    }

    pub fn with_auto_accept_credential(mut self, auto_accept: AutoAcceptCredential) -> Self {
        self.auto_accept_credential = auto_accept;
        self
    }

    pub fn with_auto_accept_proof(mut self, auto_accept: AutoAcceptProof) -> Self {
        self.auto_accept_proof = auto_accept;
        self
    }

    pub fn get_label(&self) -> String {
        self.label.to_owned()
    }

    pub fn get_auto_accept_connections(&self) -> bool {
        self.auto_accept_connections
    }

    pub fn get_auto_accept_credential(&self) -> AutoAcceptCredential {
        self.auto_accept_credential
    }

    pub fn get_auto_accept_proof(&self) -> AutoAcceptProof {
        self.auto_accept_proof
    }

    pub fn get_endpoint(&self) -> Option<String> {
        self.endpoint.to_owned()
    }
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            label: "aries-agent".to_string(),
            auto_accept_connections: false,
            auto_accept_credential: AutoAcceptCredential::Never,
            auto_accept_proof: AutoAcceptProof::Never,
            endpoint: None,
        }
    }
}

impl ToValidate for AgentOptions {
    fn validate(&self) -> Result<(), CommonError> {
        if self.label.trim().is_empty() {
            return Err(CommonError::ValidationError(
                "config: agent:label is missing".to_string(),
            ));
        }

        if let Some(endpoint) = &self.endpoint {
            if !ENDPOINT_SCHEMES
                .iter()
                .any(|scheme| endpoint.starts_with(scheme))
            {
                return Err(CommonError::ValidationError(
                    "config: agent:endpoint is invalid".to_string(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::path::PathBuf;

    use rstdev_config::format::use_toml;
    use rstdev_config::parser::from_file;
    use rstdev_config::{types::ConfigError, Builder};
    use table_test::table_test;

    use crate::common::helpers;

    #[test]
    fn test_parse_agent_config() -> Result<(), ConfigError> {
        let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        path.push("src/config/fixtures");

        let toml_file = format!("{}/config_agent.toml", path.display());
        let config_toml = {
            let config_builder: Result<AgentOptions, ConfigError> =
                Builder::new(from_file(toml_file)).fetch()?.parse(use_toml);

            config_builder
        };

        assert!(!config_toml.is_err());

        let config_agent = config_toml.unwrap();
        assert_eq!(config_agent.get_label(), "alice".to_string());
        assert!(!config_agent.get_auto_accept_connections());
        assert_eq!(
            config_agent.get_auto_accept_credential(),
            AutoAcceptCredential::Never
        );
        assert_eq!(
            config_agent.get_auto_accept_proof(),
            AutoAcceptProof::ContentApproved
        );
        assert!(config_agent.get_endpoint().is_none());
        Ok(())
    }

    #[test]
    fn test_agent_validation() {
        let table = vec![
            (("alice", None), None),
            (("", None), Some("agent:label")),
            (("  ", None), Some("agent:label")),
            (("alice", Some("https://alice.example.com")), None),
            (("alice", Some("wss://alice.example.com/ws")), None),
            (("alice", Some("alice.example.com")), Some("agent:endpoint")),
        ];

        for (validator, (label, endpoint), expected) in table_test!(table) {
            let mut options = AgentOptions::new(label);
            if let Some(endpoint) = endpoint {
                options = options.with_endpoint(endpoint);
            }

            let actual = match helpers::validate(options) {
                Ok(_) => None,
                Err(err) => match expected {
                    Some(field) if err.to_string().contains(field) => Some(field),
                    _ => Some("unexpected"),
                },
            };

            validator
                .given(&format!("label {:?} and endpoint {:?}", label, endpoint))
                .when("validating the agent section")
                .then(&format!("it should fail on {:?}", expected))
                .assert_eq(expected, actual);
        }
    }
}
