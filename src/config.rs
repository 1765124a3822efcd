//! Process configuration read from the environment.

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::AppError;
use crate::store::DEFAULT_MAX_EVENTS;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Secret for Stripe-style signature checks; unset disables verification.
    pub stripe_webhook_secret: Option<String>,
    pub max_events: usize,
    /// Enables store snapshots when set.
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
            stripe_webhook_secret: None,
            max_events: DEFAULT_MAX_EVENTS,
            data_dir: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or empty values take defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let port = match get("PORT") {
            Some(v) => v
                .trim()
                .parse()
                .map_err(|e| AppError::Config(format!("PORT must be a valid u16: {e}")))?,
            None => defaults.port,
        };

        let max_events = match get("MAX_EVENTS") {
            Some(v) => match v.trim().parse::<usize>() {
                Ok(n) if n >= 1 => n,
                Ok(_) => return Err(AppError::Config("MAX_EVENTS must be at least 1".to_string())),
                Err(e) => {
                    return Err(AppError::Config(format!(
                        "MAX_EVENTS must be a positive integer: {e}"
                    )));
                }
            },
            None => defaults.max_events,
        };

        Ok(Self {
            host: get("HOST").unwrap_or(defaults.host),
            port,
            stripe_webhook_secret: get("STRIPE_WEBHOOK_SECRET"),
            max_events,
            data_dir: get("DATA_DIR").map(PathBuf::from),
        })
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))
    }
}
