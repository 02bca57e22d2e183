//! Configuration management for ridechat.

use crate::chat::types::{Identity, Role};
use crate::error::{Error, Result};
use crate::platform;
use crate::store::BackendKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default poll interval for the sync channel.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1500;

/// Order id used when none is given on the command line.
pub const DEFAULT_ORDER_ID: &str = "ORD-DEMO-0001";

/// Main configuration struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the shared store.
    pub store_dir: PathBuf,

    /// Which key-value backend to open.
    #[serde(default)]
    pub backend: BackendKind,

    /// Interval of the poll trigger, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Whether to listen for change notifications from other contexts.
    #[serde(default = "default_push_enabled")]
    pub push_enabled: bool,

    /// Conversation used when no order id is given.
    #[serde(default = "default_order_id")]
    pub default_order_id: String,

    /// Signed-in customer, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<Identity>,

    /// Signed-in driver, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<Identity>,
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_push_enabled() -> bool {
    true
}

fn default_order_id() -> String {
    DEFAULT_ORDER_ID.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_dir: platform::store_dir(),
            backend: BackendKind::default(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            push_enabled: true,
            default_order_id: default_order_id(),
            customer: None,
            driver: None,
        }
    }
}

impl Config {
    /// Load configuration from the default config file.
    pub fn load() -> Result<Self> {
        let config_path = platform::config_file_path();

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)?;
            let mut config: Config = serde_json::from_str(&contents)?;
            config.fix_invalid_values();
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Fix any invalid or empty values with sensible defaults.
    fn fix_invalid_values(&mut self) {
        if self.store_dir.as_os_str().is_empty() {
            self.store_dir = platform::store_dir();
        }
        // A zero interval would spin the poll loop
        if self.poll_interval_ms == 0 {
            self.poll_interval_ms = DEFAULT_POLL_INTERVAL_MS;
        }
        if self.default_order_id.trim().is_empty() {
            self.default_order_id = default_order_id();
        }
    }

    /// Save configuration to the default config file.
    pub fn save(&mut self) -> Result<()> {
        self.fix_invalid_values();

        let config_path = platform::config_file_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, contents)?;

        Ok(())
    }

    /// Load configuration from environment variables, falling back to file/defaults.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;

        if let Ok(dir) = std::env::var("RIDECHAT_STORE_DIR") {
            config.store_dir = PathBuf::from(dir);
        }

        if let Ok(backend) = std::env::var("RIDECHAT_BACKEND") {
            config.backend = backend.parse()?;
        }

        if let Ok(ms) = std::env::var("RIDECHAT_POLL_MS") {
            config.poll_interval_ms = ms
                .parse()
                .map_err(|_| Error::Config(format!("invalid RIDECHAT_POLL_MS: {}", ms)))?;
        }

        config.fix_invalid_values();
        Ok(config)
    }

    /// Poll interval as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Configured identity for a role. System has none.
    pub fn identity(&self, role: Role) -> Option<&Identity> {
        match role {
            Role::Customer => self.customer.as_ref(),
            Role::Driver => self.driver.as_ref(),
            Role::System => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: Config = serde_json::from_str(r#"{"store_dir": "/tmp/rc"}"#).unwrap();
        assert_eq!(config.backend, BackendKind::File);
        assert_eq!(config.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert!(config.push_enabled);
        assert_eq!(config.default_order_id, DEFAULT_ORDER_ID);
        assert!(config.customer.is_none());
    }

    #[test]
    fn test_fix_invalid_values() {
        let mut config = Config {
            store_dir: PathBuf::new(),
            poll_interval_ms: 0,
            default_order_id: "  ".to_string(),
            ..Config::default()
        };
        config.fix_invalid_values();

        assert_eq!(config.store_dir, platform::store_dir());
        assert_eq!(config.poll_interval(), Duration::from_millis(1500));
        assert_eq!(config.default_order_id, DEFAULT_ORDER_ID);
    }

    #[test]
    fn test_identity_lookup() {
        let config = Config {
            driver: Some(Identity::new("Dana", Some("dana@drivers.example".to_string()))),
            ..Config::default()
        };
        assert_eq!(config.identity(Role::Driver).unwrap().name, "Dana");
        assert!(config.identity(Role::Customer).is_none());
        assert!(config.identity(Role::System).is_none());
    }
}
