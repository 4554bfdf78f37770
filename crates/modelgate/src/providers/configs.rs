//! Immutable per-provider configuration, built once at startup and moved into
//! the adapter that uses it.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use super::{anthropic, deepseek, google, openai};
use crate::errors::{GatewayError, GatewayResult};
use crate::models::message::Role;
use crate::models::spec::{ModelSpec, ProviderFamily};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-role switch for rewriting single-part text content to a bare string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentCollapse {
    #[serde(default)]
    pub system: bool,
    #[serde(default)]
    pub user: bool,
    #[serde(default)]
    pub assistant: bool,
    #[serde(default)]
    pub tool: bool,
}

impl ContentCollapse {
    pub const NONE: ContentCollapse = ContentCollapse {
        system: false,
        user: false,
        assistant: false,
        tool: false,
    };

    pub const ALL: ContentCollapse = ContentCollapse {
        system: true,
        user: true,
        assistant: true,
        tool: true,
    };

    pub fn for_role(&self, role: Role) -> bool {
        match role {
            Role::System => self.system,
            Role::User => self.user,
            Role::Assistant => self.assistant,
            Role::Tool => self.tool,
        }
    }

    /// Flag for a role as it appears on the wire; unknown wire roles never collapse.
    pub fn for_wire_role(&self, role: &str) -> bool {
        Role::parse(role).map_or(false, |role| self.for_role(role))
    }
}

/// Where and how to reach a provider's HTTP API.
#[derive(Debug)]
pub struct EndpointConfig {
    pub host: String,
    pub api_key: SecretString,
    pub connect_timeout: Duration,
}

impl EndpointConfig {
    pub fn new<H: Into<String>>(host: H, api_key: SecretString) -> Self {
        Self {
            host: host.into(),
            api_key,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// `host` joined with `path`, without doubling the slash.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.host.trim_end_matches('/'), path)
    }

    pub fn validate(&self, family: ProviderFamily) -> GatewayResult<()> {
        if self.api_key.expose_secret().trim().is_empty() {
            return Err(GatewayError::Configuration(format!(
                "{} is enabled but has no api key",
                family
            )));
        }

        let url = Url::parse(&self.host).map_err(|e| {
            GatewayError::Configuration(format!("{} base url '{}' is invalid: {}", family, self.host, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(GatewayError::Configuration(format!(
                "{} base url must be http or https, got '{}'",
                family,
                url.scheme()
            )));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct OpenAiProviderConfig {
    pub endpoint: EndpointConfig,
    pub models: Vec<ModelSpec>,
    pub collapse: ContentCollapse,
}

impl OpenAiProviderConfig {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            endpoint: EndpointConfig::new(openai::OPENAI_HOST, api_key),
            models: openai::default_models(),
            collapse: ContentCollapse::NONE,
        }
    }
}

#[derive(Debug)]
pub struct AnthropicProviderConfig {
    pub endpoint: EndpointConfig,
    pub models: Vec<ModelSpec>,
    pub collapse: ContentCollapse,
    /// Value of the `anthropic-version` header
    pub version: String,
    /// Sent when the caller gives no max_tokens; the API requires one
    pub default_max_tokens: u32,
}

impl AnthropicProviderConfig {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            endpoint: EndpointConfig::new(anthropic::ANTHROPIC_HOST, api_key),
            models: anthropic::default_models(),
            collapse: ContentCollapse::NONE,
            version: anthropic::ANTHROPIC_VERSION.to_string(),
            default_max_tokens: anthropic::DEFAULT_MAX_TOKENS,
        }
    }
}

#[derive(Debug)]
pub struct GoogleProviderConfig {
    pub endpoint: EndpointConfig,
    pub models: Vec<ModelSpec>,
}

impl GoogleProviderConfig {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            endpoint: EndpointConfig::new(google::GOOGLE_HOST, api_key),
            models: google::default_models(),
        }
    }
}

#[derive(Debug)]
pub struct DeepSeekProviderConfig {
    pub endpoint: EndpointConfig,
    pub models: Vec<ModelSpec>,
    pub collapse: ContentCollapse,
}

impl DeepSeekProviderConfig {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            endpoint: EndpointConfig::new(deepseek::DEEPSEEK_HOST, api_key),
            models: deepseek::default_models(),
            collapse: ContentCollapse::ALL,
        }
    }
}

/// The in-house OpenAI-compatible deployment. It has no public default host.
#[derive(Debug)]
pub struct InternalProviderConfig {
    pub endpoint: EndpointConfig,
    pub models: Vec<ModelSpec>,
    pub collapse: ContentCollapse,
}

impl InternalProviderConfig {
    pub fn new<H: Into<String>>(host: H, api_key: SecretString) -> Self {
        Self {
            endpoint: EndpointConfig::new(host, api_key),
            models: Vec::new(),
            collapse: ContentCollapse::ALL,
        }
    }
}

// Unified enum to wrap different provider configurations
#[derive(Debug)]
pub enum ProviderConfig {
    OpenAi(OpenAiProviderConfig),
    Anthropic(AnthropicProviderConfig),
    Google(GoogleProviderConfig),
    DeepSeek(DeepSeekProviderConfig),
    Internal(InternalProviderConfig),
}

impl ProviderConfig {
    pub fn family(&self) -> ProviderFamily {
        match self {
            ProviderConfig::OpenAi(_) => ProviderFamily::OpenAi,
            ProviderConfig::Anthropic(_) => ProviderFamily::Anthropic,
            ProviderConfig::Google(_) => ProviderFamily::Google,
            ProviderConfig::DeepSeek(_) => ProviderFamily::DeepSeek,
            ProviderConfig::Internal(_) => ProviderFamily::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn test_collapse_flags_per_role() {
        let collapse = ContentCollapse {
            user: true,
            ..ContentCollapse::NONE
        };
        assert!(collapse.for_role(Role::User));
        assert!(!collapse.for_role(Role::System));
        assert!(collapse.for_wire_role("user"));
        assert!(!collapse.for_wire_role("model"));
    }

    #[test]
    fn test_endpoint_validation() {
        let endpoint = EndpointConfig::new("https://api.openai.com/", SecretString::from("key".to_string()));
        assert!(endpoint.validate(ProviderFamily::OpenAi).is_ok());
        assert_eq!(
            endpoint.url("/v1/chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );

        let endpoint = EndpointConfig::new("https://api.openai.com", SecretString::from(" ".to_string()));
        let err = endpoint.validate(ProviderFamily::OpenAi).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.to_string().contains("no api key"));

        let endpoint = EndpointConfig::new("not a url", SecretString::from("key".to_string()));
        assert!(endpoint.validate(ProviderFamily::Internal).is_err());

        let endpoint = EndpointConfig::new("ftp://files.example.com", SecretString::from("key".to_string()));
        assert!(endpoint.validate(ProviderFamily::Internal).is_err());
    }

    #[test]
    fn test_provider_defaults() {
        let config = DeepSeekProviderConfig::new(SecretString::from("key".to_string()));
        assert_eq!(config.collapse, ContentCollapse::ALL);
        assert!(!config.models.is_empty());

        let config = InternalProviderConfig::new("http://llm.internal", SecretString::from("key".to_string()));
        assert!(config.models.is_empty());
        assert_eq!(
            ProviderConfig::Internal(config).family(),
            ProviderFamily::Internal
        );
    }
}
