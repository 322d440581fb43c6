//////////////////////////
// config.rs
//////////////////////////

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::AuthPolicy;

pub const ENV_AUTH_POLICY: &str = "CHESS_AUTH_POLICY";
pub const ENV_CREATION_POLICY: &str = "CHESS_CREATION_POLICY";
pub const ENV_REQUIRE_JOIN: &str = "CHESS_REQUIRE_JOIN";

/// Whether referring to an unknown game id creates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreationPolicy {
    /// Games exist only after `start_game` or `create_game`.
    #[default]
    Explicit,
    /// Any operation on a well-formed unknown id starts a fresh game there.
    AutoCreate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    pub auth: AuthPolicy,
    pub creation: CreationPolicy,
    /// Moves are refused until the mover's side has joined.
    pub require_join: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },
    #[error("auto-created games cannot hand out tokens; use the color_assertion policy")]
    AutoCreateNeedsColorAssertion,
}

impl ServiceConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: ServiceConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let io_error = |source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        };
        let mut contents = String::new();
        File::open(path)
            .and_then(|mut file| file.read_to_string(&mut contents))
            .map_err(io_error)?;
        Self::from_json_str(&contents)
    }

    /// Reads the `CHESS_*` variables; unset ones keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ServiceConfig::default();

        if let Some(value) = lookup(ENV_AUTH_POLICY) {
            config.auth = match value.trim() {
                "token" => AuthPolicy::Token,
                "color_assertion" => AuthPolicy::ColorAssertion,
                _ => return Err(invalid(ENV_AUTH_POLICY, value)),
            };
        }
        if let Some(value) = lookup(ENV_CREATION_POLICY) {
            config.creation = match value.trim() {
                "explicit" => CreationPolicy::Explicit,
                "auto_create" => CreationPolicy::AutoCreate,
                _ => return Err(invalid(ENV_CREATION_POLICY, value)),
            };
        }
        if let Some(value) = lookup(ENV_REQUIRE_JOIN) {
            config.require_join = match value.trim() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => return Err(invalid(ENV_REQUIRE_JOIN, value)),
            };
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.creation == CreationPolicy::AutoCreate && self.auth == AuthPolicy::Token {
            return Err(ConfigError::AutoCreateNeedsColorAssertion);
        }
        Ok(())
    }
}

fn invalid(key: &'static str, value: String) -> ConfigError {
    ConfigError::InvalidValue { key, value }
}
