//! Single-attempt reachability probes.
//!
//! A probe resolves the target, then runs one [`Reach`] step (TCP connect or
//! HTTP HEAD) under a per-attempt timeout. Every attempt reports through its
//! [`EventSink`] exactly once, unless it was aborted first.

mod http;
mod resolver;
mod tcp;

pub use http::{head_url, is_downgrade, refuse_redirect, HttpHead, MAX_REDIRECTS, USER_AGENT};
pub use resolver::{pick_address, DnsResolver, Resolve};
pub use tcp::TcpConnect;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::MAX_TIMEOUT_MS;
use crate::models::{ProbeMode, ProbeResult, ProbeStatus};

pub type TcpConnectProbe = NetProbe<TcpConnect>;
pub type HttpHeadProbe = NetProbe<HttpHead>;

/// Event emitted by a probe attempt, tagged with the attempt number it
/// belongs to.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeEvent {
    DnsResolved { attempt: u64, dns_ms: i64, ip: String },
    Finished { attempt: u64, result: ProbeResult },
}

impl ProbeEvent {
    pub fn attempt(&self) -> u64 {
        match self {
            ProbeEvent::DnsResolved { attempt, .. } | ProbeEvent::Finished { attempt, .. } => *attempt,
        }
    }
}

/// Where a probe delivers its events.
#[derive(Debug, Clone)]
pub struct EventSink {
    attempt: u64,
    tx: mpsc::UnboundedSender<ProbeEvent>,
}

impl EventSink {
    pub fn new(attempt: u64, tx: mpsc::UnboundedSender<ProbeEvent>) -> Self {
        Self { attempt, tx }
    }
}

/// One probe instance. Implementations run a single attempt at a time.
pub trait Probe: Send {
    /// Begin an attempt. Returns `false` without side effects while an
    /// attempt is already in flight.
    fn start(&mut self, host: &str, port: u16, timeout: Duration) -> bool;

    /// Cancel the in-flight attempt without emitting a result.
    fn abort(&mut self);

    fn is_active(&self) -> bool;
}

/// Outcome of the connect/request phase of an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reached {
    Up { http_code: Option<u16> },
    Down { http_code: Option<u16>, message: String },
    Error { message: String },
}

/// The protocol-specific step of an attempt, run against an already
/// resolved address.
pub trait Reach: Send + Sync + 'static {
    fn reach(&self, host: &str, ip: IpAddr, port: u16) -> BoxFuture<'static, Reached>;
}

/// Builds a fresh probe for every attempt.
pub trait ProbeFactory: Send + Sync {
    fn create(&self, mode: ProbeMode, sink: EventSink) -> Box<dyn Probe>;
}

/// Production factory: hickory-backed resolution, real sockets.
pub struct NetProbeFactory {
    resolver: Arc<dyn Resolve>,
}

impl NetProbeFactory {
    pub fn new(resolver: Arc<dyn Resolve>) -> Self {
        Self { resolver }
    }
}

impl ProbeFactory for NetProbeFactory {
    fn create(&self, mode: ProbeMode, sink: EventSink) -> Box<dyn Probe> {
        let resolver = Arc::clone(&self.resolver);
        match mode {
            ProbeMode::TcpConnect => Box::new(NetProbe::new(TcpConnect, resolver, sink)),
            ProbeMode::HttpHead => Box::new(NetProbe::new(HttpHead, resolver, sink)),
        }
    }
}

/// Guards the event sender of one attempt. Terminal emission and abort both
/// flip `live` under the same lock, so at most one of them wins.
#[derive(Clone)]
struct Gate {
    live: Arc<Mutex<bool>>,
    sink: EventSink,
}

impl Gate {
    fn open(sink: EventSink) -> Self {
        Self {
            live: Arc::new(Mutex::new(true)),
            sink,
        }
    }

    fn is_live(&self) -> bool {
        *self.live.lock()
    }

    fn progress(&self, dns_ms: i64, ip: &IpAddr) {
        let live = self.live.lock();
        if *live {
            let _ = self.sink.tx.send(ProbeEvent::DnsResolved {
                attempt: self.sink.attempt,
                dns_ms,
                ip: ip.to_string(),
            });
        }
    }

    /// Returns false when the attempt was already closed.
    fn finish(&self, result: ProbeResult) -> bool {
        let mut live = self.live.lock();
        if !*live {
            return false;
        }
        *live = false;
        let _ = self.sink.tx.send(ProbeEvent::Finished {
            attempt: self.sink.attempt,
            result,
        });
        true
    }

    fn close(&self) -> bool {
        std::mem::replace(&mut *self.live.lock(), false)
    }
}

struct Attempt {
    gate: Gate,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

/// What DNS produced before the attempt ended; read on timeout.
#[derive(Default)]
struct Progress {
    dns_ms: i64,
    ip: String,
}

/// Resolve-then-reach probe, generic over the reach step.
pub struct NetProbe<R> {
    reach: Arc<R>,
    resolver: Arc<dyn Resolve>,
    sink: EventSink,
    attempt: Option<Attempt>,
}

impl<R: Reach> NetProbe<R> {
    pub fn new(reach: R, resolver: Arc<dyn Resolve>, sink: EventSink) -> Self {
        Self {
            reach: Arc::new(reach),
            resolver,
            sink,
            attempt: None,
        }
    }
}

impl<R: Reach> Probe for NetProbe<R> {
    fn start(&mut self, host: &str, port: u16, timeout: Duration) -> bool {
        if self.is_active() {
            debug!(attempt = self.sink.attempt, "probe already active, ignoring start");
            return false;
        }

        let started = Instant::now();
        let timeout = timeout.min(Duration::from_millis(MAX_TIMEOUT_MS));
        let gate = Gate::open(self.sink.clone());
        let cancel = CancellationToken::new();
        let host = host.trim().to_string();

        if host.is_empty() || port == 0 {
            gate.finish(ProbeResult::error(format!("invalid target '{}:{}'", host, port)));
            self.attempt = Some(Attempt { gate, cancel, task: None });
            return true;
        }

        let task = tokio::spawn(run_attempt(
            Arc::clone(&self.reach),
            Arc::clone(&self.resolver),
            host,
            port,
            started,
            timeout,
            gate.clone(),
            cancel.clone(),
        ));
        self.attempt = Some(Attempt { gate, cancel, task: Some(task) });
        true
    }

    fn abort(&mut self) {
        let Some(attempt) = self.attempt.take() else {
            return;
        };
        if attempt.gate.close() {
            debug!(attempt = self.sink.attempt, "probe aborted");
        }
        attempt.cancel.cancel();
        if let Some(task) = attempt.task {
            task.abort();
        }
    }

    fn is_active(&self) -> bool {
        self.attempt.as_ref().is_some_and(|a| a.gate.is_live())
    }
}

impl<R> Drop for NetProbe<R> {
    fn drop(&mut self) {
        if let Some(attempt) = self.attempt.take() {
            attempt.gate.close();
            attempt.cancel.cancel();
            if let Some(task) = attempt.task {
                task.abort();
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_attempt<R: Reach>(
    reach: Arc<R>,
    resolver: Arc<dyn Resolve>,
    host: String,
    port: u16,
    started: Instant,
    timeout: Duration,
    gate: Gate,
    cancel: CancellationToken,
) {
    let progress = Mutex::new(Progress { dns_ms: -1, ip: String::new() });

    // Dropping the losing branches closes sockets and cancels requests.
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        result = resolve_and_reach(&*reach, &*resolver, &host, port, started, &progress, &gate) => result,
        _ = tokio::time::sleep_until(started + timeout) => {
            let p = progress.lock();
            ProbeResult::timeout(p.dns_ms, p.ip.clone(), timeout.as_millis())
        }
    };

    debug!(
        attempt = gate.sink.attempt,
        status = ?result.status,
        latency_ms = result.latency_ms,
        "probe attempt finished"
    );
    gate.finish(result);
}

async fn resolve_and_reach<R: Reach>(
    reach: &R,
    resolver: &dyn Resolve,
    host: &str,
    port: u16,
    started: Instant,
    progress: &Mutex<Progress>,
    gate: &Gate,
) -> ProbeResult {
    let addrs = match resolver.resolve(host).await {
        Ok(addrs) => addrs,
        Err(e) => return ProbeResult::dns_fail(format!("{:#}", e)),
    };
    let Some(ip) = pick_address(&addrs) else {
        return ProbeResult::dns_fail(format!("no addresses found for {}", host));
    };

    let dns_ms = elapsed_ms(started);
    {
        let mut p = progress.lock();
        p.dns_ms = dns_ms;
        p.ip = ip.to_string();
    }
    gate.progress(dns_ms, &ip);

    let reached = reach.reach(host, ip, port).await;
    let mut result = ProbeResult {
        dns_ms,
        ip: ip.to_string(),
        ..ProbeResult::default()
    };
    match reached {
        Reached::Up { http_code } => {
            result.status = ProbeStatus::Up;
            result.latency_ms = elapsed_ms(started);
            result.http_code = http_code;
        }
        Reached::Down { http_code, message } => {
            result.status = ProbeStatus::Down;
            result.http_code = http_code;
            result.message = message;
        }
        Reached::Error { message } => {
            result.status = ProbeStatus::Error;
            result.message = message;
        }
    }
    result
}

fn elapsed_ms(since: Instant) -> i64 {
    since.elapsed().as_millis() as i64
}
