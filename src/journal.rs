//! Human-readable, timestamped log of monitor activity.

use anyhow::{Context, Result};
use chrono::Local;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::models::{MonitorEvent, ProbeStatus};

#[derive(Clone)]
pub struct Journal {
    lines: Arc<Mutex<VecDeque<String>>>,
    limit: usize,
}

impl Journal {
    pub fn new(limit: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::new())),
            limit: limit.max(1),
        }
    }

    /// Append `[YYYY-MM-DD HH:MM:SS] text`, dropping the oldest line when full.
    pub fn append(&self, text: impl AsRef<str>) {
        let text = text.as_ref();
        let line = format!("[{}] {}", Local::now().format("%Y-%m-%d %H:%M:%S"), text);
        let mut lines = self.lines.lock();
        lines.push_back(line);
        while lines.len() > self.limit {
            lines.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }

    pub fn text(&self) -> String {
        let lines = self.lines.lock();
        let mut out = String::new();
        for line in lines.iter() {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    /// Write the journal verbatim to `path`. The outcome is recorded in the
    /// journal itself.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let written = std::fs::write(path, self.text())
            .with_context(|| format!("Failed to write {}", path.display()));
        match &written {
            Ok(()) => {
                info!("Log saved to {}", path.display());
                self.append(format!("Log saved: {}", path.display()));
            }
            Err(e) => {
                error!("{:#}", e);
                self.append(format!("Failed to save log: {:#}", e));
            }
        }
        written
    }

    /// Record controller events until cancelled or the controller goes away.
    pub async fn follow(self, mut events: broadcast::Receiver<MonitorEvent>, cancel: CancellationToken) {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => event,
            };
            match event {
                Ok(event) => {
                    if let Some(line) = describe(&event) {
                        match &event {
                            MonitorEvent::ProbeFinished(r) if !r.is_up() => warn!("{}", line),
                            _ => info!("{}", line),
                        }
                        self.append(line);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Journal lagged behind, {} events skipped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}

/// Journal line for an event.
pub fn describe(event: &MonitorEvent) -> Option<String> {
    let line = match event {
        MonitorEvent::ProbeStarted { mode, target } => format!("Checking {} {}…", mode, target),
        MonitorEvent::ProbeProgressDns { dns_ms, ip } => format!("DNS {} ms ({})", dns_ms, ip),
        MonitorEvent::StatsUpdated(s) => {
            if s.count == 0 {
                return None;
            }
            format!(
                "Stats: min {} ms / avg {} ms / max {} ms (n={})",
                s.min_ms, s.avg_ms, s.max_ms, s.count
            )
        }
        MonitorEvent::ProbeFinished(r) => match r.status {
            ProbeStatus::Up => match r.http_code {
                Some(code) => format!("HTTP OK {}, {} ms", code, r.latency_ms),
                None => format!("TCP reachable, latency {} ms", r.latency_ms),
            },
            ProbeStatus::Down => format!("UNREACHABLE: {}", r.message),
            ProbeStatus::DnsFail => format!("DNS error: {}", r.message),
            ProbeStatus::Timeout => format!("TIMEOUT ({})", r.message),
            ProbeStatus::Error if r.message.is_empty() => "Unknown error".to_string(),
            ProbeStatus::Error => r.message.clone(),
        },
    };
    Some(line)
}
