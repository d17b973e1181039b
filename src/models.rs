use serde::{Deserialize, Serialize};
use std::fmt;

use crate::stats::StatsSnapshot;

/// Terminal classification of one probe attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Up,
    Down,
    DnsFail,
    Timeout,
    Error,
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProbeStatus::Up => "UP",
            ProbeStatus::Down => "DOWN",
            ProbeStatus::DnsFail => "DNS FAIL",
            ProbeStatus::Timeout => "TIMEOUT",
            ProbeStatus::Error => "ERROR",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeMode {
    #[default]
    #[serde(alias = "tcp")]
    TcpConnect,
    #[serde(alias = "http")]
    HttpHead,
}

impl fmt::Display for ProbeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeMode::TcpConnect => f.write_str("TCP"),
            ProbeMode::HttpHead => f.write_str("HTTP"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

impl Target {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Outcome of one probe attempt. `latency_ms` and `dns_ms` use -1 for
/// "not measured".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub status: ProbeStatus,
    pub latency_ms: i64,
    pub dns_ms: i64,
    pub http_code: Option<u16>,
    pub ip: String,
    pub message: String,
}

impl Default for ProbeResult {
    fn default() -> Self {
        Self {
            status: ProbeStatus::Error,
            latency_ms: -1,
            dns_ms: -1,
            http_code: None,
            ip: String::new(),
            message: String::new(),
        }
    }
}

impl ProbeResult {
    pub fn dns_fail(message: impl Into<String>) -> Self {
        Self {
            status: ProbeStatus::DnsFail,
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn timeout(dns_ms: i64, ip: impl Into<String>, budget_ms: u128) -> Self {
        Self {
            status: ProbeStatus::Timeout,
            dns_ms,
            ip: ip.into(),
            message: format!("timed out after {} ms", budget_ms),
            ..Self::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ProbeStatus::Error,
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn is_up(&self) -> bool {
        self.status == ProbeStatus::Up
    }
}

/// Notifications published by the monitor controller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    ProbeStarted { mode: ProbeMode, target: Target },
    ProbeProgressDns { dns_ms: i64, ip: String },
    ProbeFinished(ProbeResult),
    StatsUpdated(StatsSnapshot),
}

/// Point-in-time view of the controller, served by the control API.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    pub running: bool,
    pub probing: bool,
    pub mode: ProbeMode,
    pub target: Target,
    pub interval_sec: u64,
    pub timeout_ms: u64,
    pub max_samples: usize,
    pub stats: StatsSnapshot,
    pub last_result: Option<ProbeResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_result_is_unmeasured_error() {
        let r = ProbeResult::default();
        assert_eq!(r.status, ProbeStatus::Error);
        assert_eq!(r.latency_ms, -1);
        assert_eq!(r.dns_ms, -1);
        assert!(r.ip.is_empty());
        assert!(r.http_code.is_none());
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(ProbeStatus::Up.to_string(), "UP");
        assert_eq!(ProbeStatus::DnsFail.to_string(), "DNS FAIL");
        assert_eq!(ProbeStatus::Timeout.to_string(), "TIMEOUT");
    }

    #[test]
    fn test_timeout_keeps_dns_progress() {
        let r = ProbeResult::timeout(12, "10.0.0.1", 3000);
        assert_eq!(r.status, ProbeStatus::Timeout);
        assert_eq!(r.dns_ms, 12);
        assert_eq!(r.ip, "10.0.0.1");
        assert_eq!(r.latency_ms, -1);
        assert_eq!(r.message, "timed out after 3000 ms");
    }

    #[test]
    fn test_mode_aliases() {
        let m: ProbeMode = serde_json::from_str("\"http\"").unwrap();
        assert_eq!(m, ProbeMode::HttpHead);
        let m: ProbeMode = serde_json::from_str("\"tcp_connect\"").unwrap();
        assert_eq!(m, ProbeMode::TcpConnect);
        assert_eq!(serde_json::to_string(&ProbeMode::HttpHead).unwrap(), "\"http_head\"");
    }

    #[test]
    fn test_target_display_brackets_ipv6() {
        assert_eq!(Target::new("example.com", 80).to_string(), "example.com:80");
        assert_eq!(Target::new("::1", 443).to_string(), "[::1]:443");
    }
}
