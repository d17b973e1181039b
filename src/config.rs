use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::MonitorError;
use crate::models::{ProbeMode, Target};
use crate::stats::DEFAULT_MAX_SAMPLES;

/// Longest accepted scheduling period, one day.
pub const MAX_INTERVAL_SEC: u64 = 86_400;
/// Longest accepted per-attempt timeout, ten minutes.
pub const MAX_TIMEOUT_MS: u64 = 600_000;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitorConfig {
    #[serde(default)]
    pub mode: ProbeMode,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_interval_sec")]
    pub interval_sec: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
    #[serde(default)]
    pub dns: DnsUpstream,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default = "default_autostart")]
    pub autostart: bool,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default = "default_journal_lines")]
    pub journal_lines: usize,
}

/// Which upstream servers the DNS resolver queries.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DnsUpstream {
    /// Whatever the host OS is configured with
    #[default]
    System,
    Cloudflare,
    Google,
}

fn default_host() -> String { "example.com".into() }
fn default_port() -> u16 { 80 }
fn default_interval_sec() -> u64 { 5 }
fn default_timeout_ms() -> u64 { 3000 }
fn default_max_samples() -> usize { DEFAULT_MAX_SAMPLES }
fn default_api_port() -> u16 { 3000 }
fn default_autostart() -> bool { true }
fn default_journal_lines() -> usize { 5000 }

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            mode: ProbeMode::default(),
            host: default_host(),
            port: default_port(),
            interval_sec: default_interval_sec(),
            timeout_ms: default_timeout_ms(),
            max_samples: default_max_samples(),
            dns: DnsUpstream::default(),
            api_port: default_api_port(),
            autostart: default_autostart(),
            log_file: None,
            journal_lines: default_journal_lines(),
        }
    }
}

impl MonitorConfig {
    /// Read the JSON config at `path`. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("{} not found, using default configuration", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: MonitorConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.host.trim().is_empty() {
            return Err(MonitorError::InvalidConfig("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(MonitorError::InvalidConfig("port must be between 1 and 65535".into()));
        }
        check_range("interval_sec", self.interval_sec, MAX_INTERVAL_SEC)?;
        check_range("timeout_ms", self.timeout_ms, MAX_TIMEOUT_MS)?;
        if self.max_samples == 0 {
            return Err(MonitorError::InvalidConfig("max_samples must be at least 1".into()));
        }
        Ok(())
    }

    pub fn target(&self) -> Target {
        Target::new(self.host.trim(), self.port)
    }
}

/// Rejects values outside `1..=max`.
pub fn check_range(name: &str, value: u64, max: u64) -> Result<(), MonitorError> {
    if (1..=max).contains(&value) {
        Ok(())
    } else {
        Err(MonitorError::InvalidConfig(format!(
            "{} must be between 1 and {}, got {}",
            name, max, value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config: MonitorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.mode, ProbeMode::TcpConnect);
        assert_eq!(config.port, 80);
        assert_eq!(config.interval_sec, 5);
        assert_eq!(config.timeout_ms, 3000);
        assert_eq!(config.max_samples, 50);
        assert_eq!(config.dns, DnsUpstream::System);
        assert!(config.autostart);
        assert!(config.log_file.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_http_mode() {
        let config: MonitorConfig = serde_json::from_str(
            r#"{"mode": "http", "host": " example.org ", "port": 443, "dns": "cloudflare"}"#,
        )
        .unwrap();
        assert_eq!(config.mode, ProbeMode::HttpHead);
        assert_eq!(config.dns, DnsUpstream::Cloudflare);
        assert_eq!(config.target(), Target::new("example.org", 443));
    }

    #[test]
    fn test_validate_rejects_malformed() {
        let mut config = MonitorConfig::default();
        config.host = "  ".into();
        assert!(matches!(config.validate(), Err(MonitorError::InvalidConfig(_))));

        let mut config = MonitorConfig::default();
        config.port = 0;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.interval_sec = 0;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.max_samples = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_oversized_periods() {
        let mut config = MonitorConfig::default();
        config.interval_sec = u64::MAX;
        assert!(matches!(config.validate(), Err(MonitorError::InvalidConfig(_))));

        let mut config = MonitorConfig::default();
        config.timeout_ms = MAX_TIMEOUT_MS + 1;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.interval_sec = MAX_INTERVAL_SEC;
        config.timeout_ms = MAX_TIMEOUT_MS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = MonitorConfig::load("/nonexistent/netpulse/config.json").unwrap();
        assert_eq!(config.host, "example.com");
    }
}
