use rst_common::with_tracing::tracing_subscriber::{
    self, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::common::types::CommonError;

pub fn default_filter() -> String {
    format!("{}=debug,prople_aries_core=debug", env!("CARGO_CRATE_NAME"))
}

/// `init` installs the global subscriber, `RUST_LOG` takes precedence over `filter`
///
/// Records emitted through the `log` facade by the protocol services are bridged into the same
/// subscriber. Calling it a second time fails since the global subscriber is already set.
pub fn init(filter: Option<String>) -> Result<(), CommonError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.unwrap_or_else(default_filter).into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time())
        .try_init()
        .map_err(|err| CommonError::ConfigError(format!("logging: {}", err)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_once() {
        let _ = init(Some("warn".to_string()));

        let second = init(None);
        assert!(matches!(second.unwrap_err(), CommonError::ConfigError(_)))
    }

    #[test]
    fn test_default_filter() {
        assert!(default_filter().contains("prople_aries_agent=debug"))
    }
}
