use crate::error::{to_env_var, ConfigError};
use config::{Config, Environment};
use intern::exa::ExaConfig;
use intern::providers::configs::OpenAiProviderConfig;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Origin allowed by CORS
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            frontend_url: default_frontend_url(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ConfigError::InvalidAddress(format!("{}:{} ({})", self.host, self.port, e)))
    }
}

#[derive(Debug, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_openai_host")]
    pub host: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<i32>,
}

impl ProviderSettings {
    pub fn into_config(self) -> Result<OpenAiProviderConfig, ConfigError> {
        let api_key = self
            .api_key
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar {
                env_var: to_env_var("provider.api_key"),
            })?;
        Ok(OpenAiProviderConfig {
            host: self.host,
            api_key,
            model: self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct StoreSettings {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// Fill an empty database with sample emails and events
    #[serde(default)]
    pub seed_demo_data: bool,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            seed_demo_data: false,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchSettings {
    /// Web search is disabled without a key
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_search_host")]
    pub host: String,
    #[serde(default = "default_num_results")]
    pub num_results: u32,
    #[serde(default = "default_text_length_limit")]
    pub text_length_limit: u32,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            host: default_search_host(),
            num_results: default_num_results(),
            text_length_limit: default_text_length_limit(),
        }
    }
}

impl SearchSettings {
    pub fn exa_config(&self) -> Option<ExaConfig> {
        let api_key = self.api_key.as_ref().filter(|key| !key.is_empty())?;
        Some(ExaConfig {
            host: self.host.clone(),
            api_key: api_key.clone(),
            num_results: self.num_results,
            text_length_limit: self.text_length_limit,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatSettings {
    /// Models served besides `provider.model`
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default = "default_history_runs")]
    pub history_runs: usize,
    #[serde(default)]
    pub require_session_id: bool,
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            models: Vec::new(),
            history_runs: default_history_runs(),
            require_session_id: false,
            max_tool_rounds: default_max_tool_rounds(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub provider: ProviderSettings,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub chat: ChatSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        // Start with default configuration
        let config = Config::builder()
            // Server defaults
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            // Provider defaults
            .set_default("provider.host", default_openai_host())?
            .set_default("provider.model", default_model())?
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix("INTERN")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("chat.models")
                    .try_parsing(true),
            )
            .build()?;

        // Try to deserialize the configuration
        let result: Result<Self, config::ConfigError> = config.try_deserialize();

        // Handle missing field errors specially
        match result {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                // Handle both NotFound and missing field message variants
                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    // Extract field name from error message "missing field `model`"
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .split('`')
                        .next()
                        .unwrap_or_default();
                    let env_var = to_env_var(field);
                    Err(ConfigError::MissingEnvVar { env_var })
                } else if let config::ConfigError::NotFound(field) = &err {
                    let env_var = to_env_var(field);
                    Err(ConfigError::MissingEnvVar { env_var })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_frontend_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_openai_host() -> String {
    "https://api.openai.com".to_string()
}

fn default_store_path() -> PathBuf {
    PathBuf::from("intern.db")
}

fn default_search_host() -> String {
    "https://api.exa.ai".to_string()
}

fn default_num_results() -> u32 {
    5
}

fn default_text_length_limit() -> u32 {
    2000
}

fn default_history_runs() -> usize {
    intern::agent::DEFAULT_HISTORY_RUNS
}

fn default_max_tool_rounds() -> usize {
    intern::agent::DEFAULT_MAX_TOOL_ROUNDS
}
