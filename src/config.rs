//! Process configuration from the environment
//!
//! | Variable          | Default   |
//! |-------------------|-----------|
//! | `RENDEZVOUS_HOST` | `0.0.0.0` |
//! | `RENDEZVOUS_PORT` | `8080`    |
//!
//! `PORT` is honoured when `RENDEZVOUS_PORT` is unset.

use thiserror::Error;

use crate::signaling::DEFAULT_SIGNALING_PORT;

pub const DEFAULT_HOST: &str = "0.0.0.0";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid port {0:?}")]
    InvalidPort(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_SIGNALING_PORT,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes `std::env::var`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host = lookup("RENDEZVOUS_HOST")
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = match lookup("RENDEZVOUS_PORT").or_else(|| lookup("PORT")) {
            Some(raw) => match raw.trim().parse::<u16>() {
                Ok(port) => port,
                Err(_) => return Err(ConfigError::InvalidPort(raw)),
            },
            None => DEFAULT_SIGNALING_PORT,
        };

        Ok(Self { host, port })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
