//! Wallet configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use ember_utils::{Backoff, LogFormat};

use crate::WalletError;

/// What to do when one asset metadata lookup in a token batch fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenLookupPolicy {
    /// One failed lookup fails the whole token refresh.
    FailBatch,
    /// Failed lookups are logged and the token is left out.
    SkipFailed,
}

/// Bounded retry for secondary-currency loads.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl RetryConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
            self.max_attempts,
        )
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Configuration for a wallet manager.
///
/// Can be loaded from a TOML file via [`WalletConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Directory holding the keystore and created-address databases.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// LMDB map size in bytes.
    #[serde(default = "default_map_size")]
    pub map_size: usize,

    /// Asset balances requested per page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Upper bound on pages requested per token refresh.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// Fractional digits of the base currency.
    #[serde(default = "default_base_decimals")]
    pub base_decimals: u8,

    /// Deadline for any single external fetch.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    #[serde(default = "default_token_lookup_policy")]
    pub token_lookup_policy: TokenLookupPolicy,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_data_dir() -> PathBuf {
    PathBuf::from("./ember_data")
}

fn default_map_size() -> usize {
    64 * 1024 * 1024
}

fn default_page_size() -> u32 {
    100
}

fn default_max_pages() -> u32 {
    10
}

fn default_base_decimals() -> u8 {
    8
}

fn default_fetch_timeout_ms() -> u64 {
    30_000
}

fn default_token_lookup_policy() -> TokenLookupPolicy {
    TokenLookupPolicy::FailBatch
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    8_000
}

fn default_log_format() -> LogFormat {
    LogFormat::Human
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl WalletConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &std::path::Path) -> Result<Self, WalletError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| WalletError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, WalletError> {
        let config: Self = toml::from_str(s).map_err(|e| WalletError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, WalletError> {
        toml::to_string_pretty(self).map_err(|e| WalletError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), WalletError> {
        if self.page_size == 0 {
            return Err(WalletError::Config("page_size must be at least 1".into()));
        }
        if self.max_pages == 0 {
            return Err(WalletError::Config("max_pages must be at least 1".into()));
        }
        if self.fetch_timeout_ms == 0 {
            return Err(WalletError::Config("fetch_timeout_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            map_size: default_map_size(),
            page_size: default_page_size(),
            max_pages: default_max_pages(),
            base_decimals: default_base_decimals(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            token_lookup_policy: default_token_lookup_policy(),
            retry: RetryConfig::default(),
            log_format: default_log_format(),
            log_level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = WalletConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        let parsed = WalletConfig::from_toml_str(&toml_str).expect("should parse");
        assert_eq!(parsed.page_size, config.page_size);
        assert_eq!(parsed.retry.max_attempts, config.retry.max_attempts);
        assert_eq!(parsed.token_lookup_policy, TokenLookupPolicy::FailBatch);
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = WalletConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config.page_size, 100);
        assert_eq!(config.base_decimals, 8);
        assert_eq!(config.fetch_timeout(), Duration::from_secs(30));
        assert_eq!(config.log_format, LogFormat::Human);
    }

    #[test]
    fn partial_toml_overrides() {
        let toml = r#"
            page_size = 25
            token_lookup_policy = "skip_failed"

            [retry]
            max_attempts = 5
        "#;
        let config = WalletConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.page_size, 25);
        assert_eq!(config.token_lookup_policy, TokenLookupPolicy::SkipFailed);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_backoff_ms, 500);
    }

    #[test]
    fn zero_page_size_rejected() {
        let result = WalletConfig::from_toml_str("page_size = 0");
        assert!(matches!(result, Err(WalletError::Config(_))));
    }

    #[test]
    fn backoff_from_retry_config() {
        let retry = RetryConfig {
            max_attempts: 2,
            initial_backoff_ms: 10,
            max_backoff_ms: 10,
        };
        let backoff = retry.backoff();
        assert_eq!(backoff.delay_after(1), Some(Duration::from_millis(10)));
        assert_eq!(backoff.delay_after(2), None);
    }
}
