use crate::error::{to_env_var, ConfigError, ENV_PREFIX};
use config::{Config, Environment};
use modelgate::models::spec::{ModelSpec, ProviderFamily};
use modelgate::providers::configs::{
    AnthropicProviderConfig, ContentCollapse, DeepSeekProviderConfig, EndpointConfig,
    GoogleProviderConfig, InternalProviderConfig, OpenAiProviderConfig, ProviderConfig,
};
use modelgate::usecase::GenerationDefaults;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Deadline applied to every inbound call, streams included
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Chunks buffered between a stream's upstream reader and its client
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout_secs(),
            stream_buffer: default_stream_buffer(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ConfigError::Invalid {
                env_var: to_env_var("server.host"),
                message: format!("'{}' is not a socket address: {}", self.host, e),
            })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AuthSettings {
    /// Shared secret callers must present. Unset disables authentication.
    #[serde(default)]
    pub secret: Option<SecretString>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogSettings {
    #[serde(default)]
    pub format: LogFormat,
}

/// Per-role overrides of a provider's default content collapsing.
#[derive(Debug, Default, Deserialize)]
pub struct CollapseSettings {
    #[serde(default)]
    pub system: Option<bool>,
    #[serde(default)]
    pub user: Option<bool>,
    #[serde(default)]
    pub assistant: Option<bool>,
    #[serde(default)]
    pub tool: Option<bool>,
}

impl CollapseSettings {
    pub fn apply(&self, base: ContentCollapse) -> ContentCollapse {
        ContentCollapse {
            system: self.system.unwrap_or(base.system),
            user: self.user.unwrap_or(base.user),
            assistant: self.assistant.unwrap_or(base.assistant),
            tool: self.tool.unwrap_or(base.tool),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub api_key: Option<SecretString>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default, deserialize_with = "comma_list")]
    pub models: Vec<String>,
    #[serde(default, deserialize_with = "comma_list")]
    pub embedding_models: Vec<String>,
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    #[serde(default)]
    pub collapse: CollapseSettings,
    // Anthropic only
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub default_max_tokens: Option<u32>,
}

impl ProviderSettings {
    fn api_key(&self, name: &str) -> Result<SecretString, ConfigError> {
        match &self.api_key {
            Some(key) if !key.expose_secret().trim().is_empty() => {
                Ok(SecretString::from(key.expose_secret().to_string()))
            }
            _ => Err(ConfigError::MissingEnvVar {
                env_var: to_env_var(&format!("providers.{}.api_key", name)),
            }),
        }
    }

    fn apply_endpoint(&self, endpoint: &mut EndpointConfig) {
        if let Some(base_url) = &self.base_url {
            endpoint.host = base_url.clone();
        }
        if let Some(secs) = self.connect_timeout_secs {
            endpoint.connect_timeout = Duration::from_secs(secs);
        }
    }

    /// Configured model lists replace the adapter's advertised defaults.
    fn apply_models(&self, models: &mut Vec<ModelSpec>, family: ProviderFamily) {
        if self.models.is_empty() && self.embedding_models.is_empty() {
            return;
        }
        *models = self
            .models
            .iter()
            .map(|id| ModelSpec::chat(id.as_str(), family))
            .chain(
                self.embedding_models
                    .iter()
                    .map(|id| ModelSpec::embedding(id.as_str(), family)),
            )
            .collect();
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ProvidersSettings {
    #[serde(default)]
    pub openai: Option<ProviderSettings>,
    #[serde(default)]
    pub anthropic: Option<ProviderSettings>,
    #[serde(default)]
    pub google: Option<ProviderSettings>,
    #[serde(default)]
    pub deepseek: Option<ProviderSettings>,
    #[serde(default)]
    pub internal: Option<ProviderSettings>,
}

fn enabled(settings: &Option<ProviderSettings>) -> Option<&ProviderSettings> {
    settings.as_ref().filter(|settings| settings.enabled)
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub log: LogSettings,
    #[serde(default)]
    pub defaults: GenerationDefaults,
    #[serde(default)]
    pub providers: ProvidersSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Server defaults
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let result: Result<Self, config::ConfigError> = config.try_deserialize();

        let settings = match result {
            Ok(settings) => settings,
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    // "missing field `type`"
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .trim_end_matches('`');
                    return Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    });
                } else if let config::ConfigError::NotFound(field) = &err {
                    return Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    });
                }
                return Err(ConfigError::Other(err));
            }
        };

        if settings.server.stream_buffer == 0 {
            return Err(ConfigError::Invalid {
                env_var: to_env_var("server.stream_buffer"),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(settings)
    }

    /// Adapter configuration for every enabled provider, in a fixed registration order.
    pub fn provider_configs(&self) -> Result<Vec<ProviderConfig>, ConfigError> {
        let providers = &self.providers;
        let mut configs = Vec::new();

        if let Some(settings) = enabled(&providers.openai) {
            let mut config = OpenAiProviderConfig::new(settings.api_key("openai")?);
            settings.apply_endpoint(&mut config.endpoint);
            settings.apply_models(&mut config.models, ProviderFamily::OpenAi);
            config.collapse = settings.collapse.apply(config.collapse);
            configs.push(ProviderConfig::OpenAi(config));
        }

        if let Some(settings) = enabled(&providers.anthropic) {
            let mut config = AnthropicProviderConfig::new(settings.api_key("anthropic")?);
            settings.apply_endpoint(&mut config.endpoint);
            settings.apply_models(&mut config.models, ProviderFamily::Anthropic);
            config.collapse = settings.collapse.apply(config.collapse);
            if let Some(version) = &settings.version {
                config.version = version.clone();
            }
            if let Some(max_tokens) = settings.default_max_tokens {
                config.default_max_tokens = max_tokens;
            }
            configs.push(ProviderConfig::Anthropic(config));
        }

        if let Some(settings) = enabled(&providers.google) {
            let mut config = GoogleProviderConfig::new(settings.api_key("google")?);
            settings.apply_endpoint(&mut config.endpoint);
            settings.apply_models(&mut config.models, ProviderFamily::Google);
            configs.push(ProviderConfig::Google(config));
        }

        if let Some(settings) = enabled(&providers.deepseek) {
            let mut config = DeepSeekProviderConfig::new(settings.api_key("deepseek")?);
            settings.apply_endpoint(&mut config.endpoint);
            settings.apply_models(&mut config.models, ProviderFamily::DeepSeek);
            config.collapse = settings.collapse.apply(config.collapse);
            configs.push(ProviderConfig::DeepSeek(config));
        }

        if let Some(settings) = enabled(&providers.internal) {
            let base_url = settings.base_url.clone().ok_or_else(|| ConfigError::MissingEnvVar {
                env_var: to_env_var("providers.internal.base_url"),
            })?;
            if settings.models.is_empty() && settings.embedding_models.is_empty() {
                return Err(ConfigError::MissingEnvVar {
                    env_var: to_env_var("providers.internal.models"),
                });
            }
            let mut config = InternalProviderConfig::new(base_url, settings.api_key("internal")?);
            settings.apply_endpoint(&mut config.endpoint);
            settings.apply_models(&mut config.models, ProviderFamily::Internal);
            config.collapse = settings.collapse.apply(config.collapse);
            configs.push(ProviderConfig::Internal(config));
        }

        if configs.is_empty() {
            return Err(ConfigError::NoProviders);
        }
        Ok(configs)
    }
}

/// Accept either a list or a comma separated string.
fn comma_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ListOrCsv {
        List(Vec<String>),
        Csv(String),
    }

    Ok(match ListOrCsv::deserialize(deserializer)? {
        ListOrCsv::List(items) => items,
        ListOrCsv::Csv(text) => text
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(String::from)
            .collect(),
    })
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_stream_buffer() -> usize {
    32
}

fn default_enabled() -> bool {
    true
}
