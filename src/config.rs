use std::{env, net::SocketAddr, path::PathBuf, time::Duration};

use thiserror::Error;

use crate::domain::output::OutputLayout;

pub const DEFAULT_MAX_FILE_BYTES: u64 = 100 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub bind_port: u16,
    pub render_command: String,
    pub max_file_bytes: u64,
    pub output_root: PathBuf,
    pub default_category: String,
    pub keep_alive_secs: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("BIND_PORT must be a valid u16")]
    InvalidPort,
    #[error("RENDERGIT_MAX_BYTES must be a positive integer")]
    InvalidMaxBytes,
    #[error("RENDERGIT_OUTPUT_ROOT must not be empty")]
    EmptyOutputRoot,
    #[error("MCP_KEEPALIVE_SECS must be a positive integer")]
    InvalidKeepAlive,
    #[error("invalid bind address or port")]
    InvalidSocket,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any variable source; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let bind_addr = var("BIND_ADDR").unwrap_or_else(|| "0.0.0.0".to_string());
        let bind_port = var("BIND_PORT")
            .map(|value| value.parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?
            .unwrap_or(8080);
        let render_command = var("RENDERGIT_COMMAND").unwrap_or_else(|| "rendergit".to_string());
        let max_file_bytes =
            parse_positive(var("RENDERGIT_MAX_BYTES"), ConfigError::InvalidMaxBytes)?
                .unwrap_or(DEFAULT_MAX_FILE_BYTES);
        let output_root = match lookup("RENDERGIT_OUTPUT_ROOT") {
            Some(value) if value.trim().is_empty() => return Err(ConfigError::EmptyOutputRoot),
            Some(value) => PathBuf::from(value.trim()),
            None => PathBuf::from("/projects"),
        };
        let default_category =
            var("RENDERGIT_DEFAULT_CATEGORY").unwrap_or_else(|| "docker".to_string());
        let keep_alive_secs =
            parse_positive(var("MCP_KEEPALIVE_SECS"), ConfigError::InvalidKeepAlive)?
                .unwrap_or(15);

        let config = Self {
            bind_addr,
            bind_port,
            render_command,
            max_file_bytes,
            output_root,
            default_category,
            keep_alive_secs,
        };

        let _ = config.bind_socket()?;
        Ok(config)
    }

    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.bind_port)
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidSocket)
    }

    pub fn output_layout(&self) -> OutputLayout {
        OutputLayout::new(self.output_root.clone(), self.default_category.clone())
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

fn parse_positive(value: Option<String>, error: ConfigError) -> Result<Option<u64>, ConfigError> {
    match value {
        None => Ok(None),
        Some(value) => match value.parse::<u64>() {
            Ok(parsed) if parsed > 0 => Ok(Some(parsed)),
            _ => Err(error),
        },
    }
}
