//! Client configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::options::{DhcpOption, OptionCode};

const DEFAULT_RESPONSE_TIMEOUT_SECS: u64 = 5;
const DEFAULT_RETRY_DELAY_SECS: u64 = 1;

/// Configuration for a [`Client`](crate::Client).
///
/// Everything here has a sensible default; a plain
/// `ClientConfig::default()` with a hostname filled in is a working
/// configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Hostname sent in every request (Option 12). Empty means omitted.
    pub hostname: String,

    /// Additional options appended to every outbound request, in order.
    ///
    /// No deduplication is performed; what a server does with duplicate
    /// codes is outside this client's control.
    pub extra_options: Vec<DhcpOption>,

    /// Option codes appended to the default parameter request list.
    pub extra_request_params: Vec<u8>,

    /// How long to wait for a server reply before retrying, in seconds.
    pub response_timeout_secs: u64,

    /// Pause between failed attempts, in seconds.
    pub retry_delay_secs: u64,

    /// Whether the bound callback also fires when a renewal replaces the
    /// lease, rather than only on the initial binding.
    pub notify_renewals: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            hostname: String::new(),
            extra_options: Vec::new(),
            extra_request_params: Vec::new(),
            response_timeout_secs: DEFAULT_RESPONSE_TIMEOUT_SECS,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            notify_renewals: false,
        }
    }
}

impl ClientConfig {
    /// Loads and validates a configuration from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ClientConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the configuration to a JSON file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Checks the configuration for values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.response_timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "response_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.retry_delay_secs == 0 {
            return Err(Error::InvalidConfig(
                "retry_delay_secs must be greater than 0".to_string(),
            ));
        }

        for option in &self.extra_options {
            if option.code == OptionCode::Pad as u8 || option.code == OptionCode::End as u8 {
                return Err(Error::InvalidConfig(format!(
                    "option code {} is reserved",
                    option.code
                )));
            }
            if option.data.len() > 255 {
                return Err(Error::InvalidConfig(format!(
                    "option {} payload exceeds 255 bytes",
                    option.code
                )));
            }
        }

        for &code in &self.extra_request_params {
            if code == OptionCode::Pad as u8 || code == OptionCode::End as u8 {
                return Err(Error::InvalidConfig(format!(
                    "parameter request code {code} is reserved"
                )));
            }
        }

        Ok(())
    }

    /// Response timeout as a [`Duration`].
    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    /// Retry delay as a [`Duration`].
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}
