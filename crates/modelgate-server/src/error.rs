use thiserror::Error;

pub const ENV_PREFIX: &str = "MODELGATE";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },
    #[error("Invalid configuration for {env_var}: {message}")]
    Invalid { env_var: String, message: String },
    #[error("No provider is enabled; configure at least one {ENV_PREFIX}_PROVIDERS__<NAME>__API_KEY")]
    NoProviders,
    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// Environment variable that sets the dotted config `field`.
pub fn to_env_var(field: &str) -> String {
    format!("{}_{}", ENV_PREFIX, field.replace('.', "__").to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_env_var() {
        assert_eq!(to_env_var("server.port"), "MODELGATE_SERVER__PORT");
        assert_eq!(
            to_env_var("providers.openai.api_key"),
            "MODELGATE_PROVIDERS__OPENAI__API_KEY"
        );
    }
}
