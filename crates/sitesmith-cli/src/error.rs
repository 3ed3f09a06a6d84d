use thiserror::Error;

pub const ENV_PREFIX: &str = "SITESMITH";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required setting, set it with the {env_var} environment variable")]
    MissingEnvVar { env_var: String },

    #[error("Invalid setting: {0}")]
    Invalid(String),

    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// The environment variable that sets a dotted settings key
pub fn to_env_var(field: &str) -> String {
    format!("{}_{}", ENV_PREFIX, field.replace('.', "__").to_uppercase())
}
