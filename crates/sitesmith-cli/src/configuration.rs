use crate::error::{to_env_var, ConfigError, ENV_PREFIX};
use config::{Config, Environment};
use serde::Deserialize;
use sitesmith::developer::{ShellConfig, DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_TIMEOUT};
use sitesmith::providers::configs::{
    GeminiProviderConfig, OpenAiProviderConfig, ProviderConfig, GEMINI_DEFAULT_HOST,
    GEMINI_DEFAULT_MODEL, OPENAI_DEFAULT_HOST, OPENAI_DEFAULT_MODEL,
};
use std::time::Duration;

pub const GEMINI_API_KEY: &str = "GEMINI_API_KEY";
pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum ProviderSettings {
    Gemini {
        #[serde(default = "default_gemini_host")]
        host: String,
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default = "default_gemini_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
    },
    OpenAi {
        #[serde(default = "default_openai_host")]
        host: String,
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default = "default_openai_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
    },
}

impl ProviderSettings {
    pub fn name(&self) -> &'static str {
        match self {
            ProviderSettings::Gemini { .. } => "gemini",
            ProviderSettings::OpenAi { .. } => "openai",
        }
    }

    pub fn model(&self) -> &str {
        match self {
            ProviderSettings::Gemini { model, .. } | ProviderSettings::OpenAi { model, .. } => {
                model
            }
        }
    }

    // Convert to the sitesmith ProviderConfig, falling back to the
    // provider's conventional api key variable
    pub fn into_config(self) -> Result<ProviderConfig, ConfigError> {
        match self {
            ProviderSettings::Gemini {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            } => Ok(ProviderConfig::Gemini(GeminiProviderConfig {
                host,
                api_key: resolve_api_key(api_key, GEMINI_API_KEY)?,
                model,
                temperature,
                max_tokens,
            })),
            ProviderSettings::OpenAi {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            } => Ok(ProviderConfig::OpenAi(OpenAiProviderConfig {
                host,
                api_key: resolve_api_key(api_key, OPENAI_API_KEY)?,
                model,
                temperature,
                max_tokens,
            })),
        }
    }
}

fn resolve_api_key(configured: Option<String>, fallback: &str) -> Result<String, ConfigError> {
    configured
        .filter(|key| !key.is_empty())
        .or_else(|| std::env::var(fallback).ok().filter(|key| !key.is_empty()))
        .ok_or_else(|| ConfigError::MissingEnvVar {
            env_var: to_env_var("provider.api_key"),
        })
}

#[derive(Debug, Default, Deserialize)]
pub struct AgentSettings {
    /// Unlimited when unset
    #[serde(default)]
    pub max_rounds: Option<usize>,
    #[serde(default)]
    pub keep_history: bool,
}

#[derive(Debug, Deserialize)]
pub struct ShellSettings {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

impl Default for ShellSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

impl ShellSettings {
    pub fn to_config(&self) -> ShellConfig {
        ShellConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            max_output_bytes: self.max_output_bytes,
            ..ShellConfig::default()
        }
    }
}

/// Values given on the command line, which win over the environment
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub provider: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub host: Option<String>,
    pub max_rounds: Option<usize>,
    pub keep_history: bool,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub provider: ProviderSettings,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub shell: ShellSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate(&Overrides::default())
    }

    pub fn with_overrides(overrides: &Overrides) -> Result<Self, ConfigError> {
        Self::load_and_validate(overrides)
    }

    fn load_and_validate(overrides: &Overrides) -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Provider defaults, the rest come from serde defaults per provider
            .set_default("provider.type", "gemini")?
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            // Then the command line
            .set_override_option("provider.type", overrides.provider.clone())?
            .set_override_option("provider.api_key", overrides.api_key.clone())?
            .set_override_option("provider.model", overrides.model.clone())?
            .set_override_option("provider.host", overrides.host.clone())?
            .set_override_option("agent.max_rounds", overrides.max_rounds.map(|n| n as i64))?
            .set_override_option("agent.keep_history", overrides.keep_history.then_some(true))?
            .build()?;

        // Try to deserialize the configuration
        let result: Result<Self, config::ConfigError> = config.try_deserialize();

        // Handle missing field errors specially
        match result {
            Ok(settings) => settings.validate(),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                // Handle both NotFound and missing field message variants
                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    // Extract field name from error message "missing field `type`"
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .trim_end_matches('`');
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else if let config::ConfigError::NotFound(field) = &err {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.agent.max_rounds == Some(0) {
            return Err(ConfigError::Invalid(format!(
                "{} must be at least 1",
                to_env_var("agent.max_rounds")
            )));
        }
        if self.shell.timeout_secs == 0 {
            return Err(ConfigError::Invalid(format!(
                "{} must be at least 1",
                to_env_var("shell.timeout_secs")
            )));
        }
        Ok(self)
    }
}

fn default_gemini_host() -> String {
    GEMINI_DEFAULT_HOST.to_string()
}

fn default_gemini_model() -> String {
    GEMINI_DEFAULT_MODEL.to_string()
}

fn default_openai_host() -> String {
    OPENAI_DEFAULT_HOST.to_string()
}

fn default_openai_model() -> String {
    OPENAI_DEFAULT_MODEL.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

fn default_max_output_bytes() -> usize {
    DEFAULT_MAX_OUTPUT_BYTES
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clean_env() {
        for (key, _) in env::vars() {
            if key.starts_with("SITESMITH_") || key == GEMINI_API_KEY || key == OPENAI_API_KEY {
                env::remove_var(&key);
            }
        }
    }

    #[test]
    #[serial]
    fn test_default_settings() {
        clean_env();
        env::set_var("SITESMITH_PROVIDER__API_KEY", "test-key");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.agent.max_rounds, None);
        assert!(!settings.agent.keep_history);
        assert_eq!(settings.shell.timeout_secs, 30);
        assert_eq!(settings.shell.max_output_bytes, 10 * 1024 * 1024);

        match settings.provider.into_config().unwrap() {
            ProviderConfig::Gemini(config) => {
                assert_eq!(config.host, "https://generativelanguage.googleapis.com");
                assert_eq!(config.api_key, "test-key");
                assert_eq!(config.model, "gemini-2.5-flash");
                assert_eq!(config.temperature, None);
            }
            other => panic!("Expected Gemini provider, got {:?}", other),
        }

        clean_env();
    }

    #[test]
    #[serial]
    fn test_openai_settings() {
        clean_env();
        env::set_var("SITESMITH_PROVIDER__TYPE", "openai");
        env::set_var("SITESMITH_PROVIDER__HOST", "https://proxy.example.com");
        env::set_var("SITESMITH_PROVIDER__MODEL", "gpt-4o-mini");
        env::set_var("SITESMITH_PROVIDER__TEMPERATURE", "0.7");
        env::set_var("SITESMITH_PROVIDER__MAX_TOKENS", "2000");
        env::set_var("SITESMITH_AGENT__MAX_ROUNDS", "25");
        env::set_var("SITESMITH_SHELL__TIMEOUT_SECS", "90");
        env::set_var(OPENAI_API_KEY, "fallback-key");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.agent.max_rounds, Some(25));
        assert_eq!(settings.shell.to_config().timeout, Duration::from_secs(90));

        match settings.provider.into_config().unwrap() {
            ProviderConfig::OpenAi(config) => {
                assert_eq!(config.host, "https://proxy.example.com");
                assert_eq!(config.api_key, "fallback-key");
                assert_eq!(config.model, "gpt-4o-mini");
                assert_eq!(config.temperature, Some(0.7));
                assert_eq!(config.max_tokens, Some(2000));
            }
            other => panic!("Expected OpenAI provider, got {:?}", other),
        }

        clean_env();
    }

    #[test]
    #[serial]
    fn test_command_line_overrides_environment() {
        clean_env();
        env::set_var("SITESMITH_PROVIDER__TYPE", "openai");
        env::set_var("SITESMITH_PROVIDER__MODEL", "gpt-4o-mini");
        env::set_var(GEMINI_API_KEY, "gemini-key");

        let overrides = Overrides {
            provider: Some("gemini".to_string()),
            model: Some("gemini-2.5-pro".to_string()),
            max_rounds: Some(5),
            keep_history: true,
            ..Overrides::default()
        };
        let settings = Settings::with_overrides(&overrides).unwrap();
        assert_eq!(settings.provider.name(), "gemini");
        assert_eq!(settings.provider.model(), "gemini-2.5-pro");
        assert_eq!(settings.agent.max_rounds, Some(5));
        assert!(settings.agent.keep_history);

        match settings.provider.into_config().unwrap() {
            ProviderConfig::Gemini(config) => assert_eq!(config.api_key, "gemini-key"),
            other => panic!("Expected Gemini provider, got {:?}", other),
        }

        clean_env();
    }

    #[test]
    #[serial]
    fn test_missing_api_key() {
        clean_env();

        let settings = Settings::new().unwrap();
        match settings.provider.into_config() {
            Err(ConfigError::MissingEnvVar { env_var }) => {
                assert_eq!(env_var, "SITESMITH_PROVIDER__API_KEY")
            }
            other => panic!("Expected missing api key, got {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn test_zero_rounds_rejected() {
        clean_env();
        env::set_var("SITESMITH_AGENT__MAX_ROUNDS", "0");

        let error = Settings::new().unwrap_err();
        assert!(matches!(error, ConfigError::Invalid(_)));

        clean_env();
    }

    #[test]
    #[serial]
    fn test_unknown_provider() {
        clean_env();
        env::set_var("SITESMITH_PROVIDER__TYPE", "anthropic");

        assert!(Settings::new().is_err());

        clean_env();
    }
}
