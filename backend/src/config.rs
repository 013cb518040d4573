//! Runtime configuration from the environment.
//!
//! A `.env` file is loaded first when present. Command-line flags override
//! what is read here.

use std::env;
use std::path::PathBuf;

use crate::error::ConfigError;
use crate::export::ExportFormat;

pub const DEFAULT_PORT: u16 = 3000;

/// Settings shared by the CLI and the server.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    /// Base URL of the remote insert API. `None` means dry run.
    pub api_url: Option<String>,
    pub api_token: Option<String>,
    /// Extra schema definitions loaded on top of the built-in ones.
    pub schema_dir: Option<PathBuf>,
    pub export_format: ExportFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            api_url: None,
            api_token: None,
            schema_dir: None,
            export_format: ExportFormat::Csv,
        }
    }
}

impl Config {
    /// Load `.env`, then read the `YARDLOAD_*` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Config::default();

        if let Some(port) = get("YARDLOAD_PORT") {
            config.port = port.parse().map_err(|_| invalid("YARDLOAD_PORT", &port))?;
        }
        if let Some(format) = get("YARDLOAD_EXPORT_FORMAT") {
            config.export_format =
                ExportFormat::parse(&format).map_err(|_| invalid("YARDLOAD_EXPORT_FORMAT", &format))?;
        }
        config.api_url = get("YARDLOAD_API_URL");
        config.api_token = get("YARDLOAD_API_TOKEN");
        config.schema_dir = get("YARDLOAD_SCHEMA_DIR").map(PathBuf::from);

        Ok(config)
    }
}

fn invalid(var: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        var: var.to_string(),
        value: value.to_string(),
    }
}
