#![allow(dead_code)]

//! Test doubles: a resolver and reach step that only sleep on the tokio
//! clock, so paused-time tests are deterministic.

use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use netpulse::probe::{EventSink, NetProbe, Probe, ProbeFactory, Reach, Reached, Resolve};
use netpulse::{MonitorConfig, MonitorController, MonitorHandle, ProbeMode};

pub const EXAMPLE_IP: Ipv4Addr = Ipv4Addr::new(93, 184, 216, 34);

/// Resolves every host to `EXAMPLE_IP` after `delay`, remembering what was asked.
pub struct FakeResolver {
    pub delay: Duration,
    pub asked: Arc<Mutex<Vec<String>>>,
}

impl Resolve for FakeResolver {
    fn resolve(&self, host: &str) -> BoxFuture<'static, anyhow::Result<Vec<IpAddr>>> {
        self.asked.lock().unwrap().push(host.to_string());
        let delay = self.delay;
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            Ok(vec![IpAddr::V4(EXAMPLE_IP)])
        })
    }
}

/// Finishes with `outcome` after `delay`.
pub struct Delayed {
    pub delay: Duration,
    pub outcome: Reached,
}

impl Reach for Delayed {
    fn reach(&self, _host: &str, _ip: IpAddr, _port: u16) -> BoxFuture<'static, Reached> {
        let delay = self.delay;
        let outcome = self.outcome.clone();
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            outcome
        })
    }
}

/// Hands out scripted outcomes in order, then quick successes.
pub struct ScriptedFactory {
    pub dns: Duration,
    pub script: Mutex<VecDeque<(Duration, Reached)>>,
    pub modes: Mutex<Vec<ProbeMode>>,
    pub asked: Arc<Mutex<Vec<String>>>,
}

impl ScriptedFactory {
    pub fn new(dns_ms: u64, script: Vec<(u64, Reached)>) -> Arc<Self> {
        Arc::new(Self {
            dns: Duration::from_millis(dns_ms),
            script: Mutex::new(
                script
                    .into_iter()
                    .map(|(ms, outcome)| (Duration::from_millis(ms), outcome))
                    .collect(),
            ),
            modes: Mutex::new(Vec::new()),
            asked: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn quick() -> Arc<Self> {
        Self::new(1, vec![])
    }

    pub fn hosts(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }

    pub fn modes(&self) -> Vec<ProbeMode> {
        self.modes.lock().unwrap().clone()
    }
}

impl ProbeFactory for ScriptedFactory {
    fn create(&self, mode: ProbeMode, sink: EventSink) -> Box<dyn Probe> {
        self.modes.lock().unwrap().push(mode);
        let (delay, outcome) = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or((Duration::from_millis(5), up()));
        let resolver = Arc::new(FakeResolver {
            delay: self.dns,
            asked: Arc::clone(&self.asked),
        });
        Box::new(NetProbe::new(Delayed { delay, outcome }, resolver, sink))
    }
}

pub fn up() -> Reached {
    Reached::Up { http_code: None }
}

pub fn down(message: &str) -> Reached {
    Reached::Down {
        http_code: None,
        message: message.to_string(),
    }
}

pub fn config(interval_sec: u64) -> MonitorConfig {
    MonitorConfig {
        interval_sec,
        autostart: false,
        ..MonitorConfig::default()
    }
}

pub fn controller(
    config: &MonitorConfig,
    factory: Arc<ScriptedFactory>,
) -> (MonitorController, MonitorHandle) {
    MonitorController::new(config, factory)
}
