use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::{MonitorConfig, MAX_INTERVAL_SEC, MAX_TIMEOUT_MS};
use crate::error::{MonitorError, Result};
use crate::models::{MonitorEvent, MonitorStatus, ProbeMode, ProbeResult, Target};
use crate::probe::{EventSink, Probe, ProbeEvent, ProbeFactory};
use crate::stats::StatsCalculator;

const EVENT_CAPACITY: usize = 256;

fn interval_from_secs(sec: u64) -> Duration {
    if sec > MAX_INTERVAL_SEC {
        warn!("interval of {}s clamped to {}s", sec, MAX_INTERVAL_SEC);
    }
    Duration::from_secs(sec.clamp(1, MAX_INTERVAL_SEC))
}

fn timeout_from_ms(ms: u64) -> Duration {
    if ms > MAX_TIMEOUT_MS {
        warn!("timeout of {}ms clamped to {}ms", ms, MAX_TIMEOUT_MS);
    }
    Duration::from_millis(ms.clamp(1, MAX_TIMEOUT_MS))
}

/// Commands accepted by a running controller.
#[derive(Debug)]
pub enum Command {
    SetMode(ProbeMode),
    SetTarget(Target),
    SetIntervalSec(u64),
    SetTimeoutMs(u64),
    SetMaxSamples(usize),
    Start,
    Stop,
    CheckOnce,
    Status(oneshot::Sender<MonitorStatus>),
}

struct ActiveProbe {
    attempt: u64,
    probe: Box<dyn Probe>,
}

/// Drives probing for one target: interval scheduling, one probe in flight
/// at a time, rolling stats. All state lives in the task running [`run`].
///
/// [`run`]: MonitorController::run
pub struct MonitorController {
    mode: ProbeMode,
    target: Target,
    interval: Duration,
    timeout: Duration,
    stats: StatsCalculator,
    last_result: Option<ProbeResult>,

    ticker: Option<Interval>,
    active: Option<ActiveProbe>,
    next_attempt: u64,

    factory: Arc<dyn ProbeFactory>,
    events: broadcast::Sender<MonitorEvent>,
    probe_tx: mpsc::UnboundedSender<ProbeEvent>,
    probe_rx: mpsc::UnboundedReceiver<ProbeEvent>,
    commands: mpsc::UnboundedReceiver<Command>,
}

/// Cloneable front end for a controller task.
#[derive(Clone)]
pub struct MonitorHandle {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<MonitorEvent>,
}

impl MonitorController {
    pub fn new(config: &MonitorConfig, factory: Arc<dyn ProbeFactory>) -> (Self, MonitorHandle) {
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (probe_tx, probe_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let controller = Self {
            mode: config.mode,
            target: config.target(),
            interval: interval_from_secs(config.interval_sec),
            timeout: timeout_from_ms(config.timeout_ms),
            stats: StatsCalculator::new(config.max_samples),
            last_result: None,
            ticker: None,
            active: None,
            next_attempt: 0,
            factory,
            events: events.clone(),
            probe_tx,
            probe_rx,
            commands,
        };
        let handle = MonitorHandle {
            commands: command_tx,
            events,
        };
        (controller, handle)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    pub fn set_mode(&mut self, mode: ProbeMode) {
        self.mode = mode;
    }

    /// Applies to the next attempt; an in-flight probe keeps its own target.
    pub fn set_target(&mut self, host: impl Into<String>, port: u16) {
        self.target = Target::new(host.into().trim(), port);
    }

    /// Clamped to `1..=MAX_INTERVAL_SEC` seconds. While running, the next tick is rescheduled one
    /// full new period from now.
    pub fn set_interval_sec(&mut self, sec: u64) {
        self.interval = interval_from_secs(sec);
        if self.ticker.is_some() {
            self.ticker = Some(self.make_ticker());
        }
    }

    pub fn set_timeout_ms(&mut self, ms: u64) {
        self.timeout = timeout_from_ms(ms);
    }

    pub fn set_max_samples(&mut self, n: usize) {
        if n == 0 {
            warn!("max_samples of 0 clamped to 1");
        }
        self.stats.set_max_samples(n);
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    pub fn is_probing(&self) -> bool {
        self.active.is_some()
    }

    pub fn stats(&self) -> &StatsCalculator {
        &self.stats
    }

    pub fn status(&self) -> MonitorStatus {
        MonitorStatus {
            running: self.is_running(),
            probing: self.is_probing(),
            mode: self.mode,
            target: self.target.clone(),
            interval_sec: self.interval.as_secs(),
            timeout_ms: self.timeout.as_millis() as u64,
            max_samples: self.stats.max_samples(),
            stats: self.stats.snapshot(),
            last_result: self.last_result.clone(),
        }
    }

    /// Start the scheduler and probe right away. No-op while running.
    pub fn start(&mut self) {
        if self.ticker.is_some() {
            return;
        }
        info!("Monitoring {} {} every {}s", self.mode, self.target, self.interval.as_secs());
        self.ticker = Some(self.make_ticker());
        self.run_probe();
    }

    /// Halt the scheduler. A probe in flight still completes and reports.
    pub fn stop(&mut self) {
        if self.ticker.take().is_some() {
            info!("Monitoring stopped");
        }
    }

    pub fn check_once(&mut self) {
        self.run_probe();
    }

    fn make_ticker(&self) -> Interval {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    fn run_probe(&mut self) {
        if self.active.is_some() {
            debug!("probe already in flight, skipping");
            return;
        }

        self.next_attempt += 1;
        let attempt = self.next_attempt;
        let target = self.target.clone();
        let sink = EventSink::new(attempt, self.probe_tx.clone());
        let mut probe = self.factory.create(self.mode, sink);

        debug!(attempt, mode = %self.mode, target = %target, "starting probe");
        self.publish(MonitorEvent::ProbeStarted {
            mode: self.mode,
            target: target.clone(),
        });

        probe.start(&target.host, target.port, self.timeout);
        self.active = Some(ActiveProbe { attempt, probe });
    }

    /// Apply one probe event. Events from attempts other than the active one
    /// are dropped.
    pub fn handle_probe_event(&mut self, event: ProbeEvent) {
        let current = self.active.as_ref().map(|a| a.attempt);
        if current != Some(event.attempt()) {
            trace!(attempt = event.attempt(), "dropping stale probe event");
            return;
        }

        match event {
            ProbeEvent::DnsResolved { dns_ms, ip, .. } => {
                self.publish(MonitorEvent::ProbeProgressDns { dns_ms, ip });
            }
            ProbeEvent::Finished { result, .. } => {
                let finished = self.active.take();
                debug!(
                    attempt = current.unwrap_or_default(),
                    status = %result.status,
                    latency_ms = result.latency_ms,
                    "probe finished"
                );

                if result.latency_ms >= 0 {
                    self.stats.add_sample(result.latency_ms);
                    self.publish(MonitorEvent::StatsUpdated(self.stats.snapshot()));
                }

                self.last_result = Some(result.clone());
                self.publish(MonitorEvent::ProbeFinished(result));
                drop(finished);
            }
        }
    }

    pub fn handle_command(&mut self, command: Command) {
        match command {
            Command::SetMode(mode) => self.set_mode(mode),
            Command::SetTarget(target) => self.set_target(target.host, target.port),
            Command::SetIntervalSec(sec) => self.set_interval_sec(sec),
            Command::SetTimeoutMs(ms) => self.set_timeout_ms(ms),
            Command::SetMaxSamples(n) => self.set_max_samples(n),
            Command::Start => self.start(),
            Command::Stop => self.stop(),
            Command::CheckOnce => self.check_once(),
            Command::Status(reply) => {
                let _ = reply.send(self.status());
            }
        }
    }

    fn publish(&self, event: MonitorEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Event loop. Returns when cancelled or when every handle is dropped.
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(event) = self.probe_rx.recv() => self.handle_probe_event(event),
                _ = next_tick(&mut self.ticker) => self.run_probe(),
            }
        }

        self.ticker = None;
        if let Some(mut active) = self.active.take() {
            active.probe.abort();
        }
        debug!("monitor controller stopped");
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

impl MonitorHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| MonitorError::ControllerClosed)
    }

    pub fn set_mode(&self, mode: ProbeMode) -> Result<()> {
        self.send(Command::SetMode(mode))
    }

    pub fn set_target(&self, host: impl Into<String>, port: u16) -> Result<()> {
        self.send(Command::SetTarget(Target::new(host, port)))
    }

    pub fn set_interval_sec(&self, sec: u64) -> Result<()> {
        self.send(Command::SetIntervalSec(sec))
    }

    pub fn set_timeout_ms(&self, ms: u64) -> Result<()> {
        self.send(Command::SetTimeoutMs(ms))
    }

    pub fn set_max_samples(&self, n: usize) -> Result<()> {
        self.send(Command::SetMaxSamples(n))
    }

    pub fn start(&self) -> Result<()> {
        self.send(Command::Start)
    }

    pub fn stop(&self) -> Result<()> {
        self.send(Command::Stop)
    }

    pub fn check_once(&self) -> Result<()> {
        self.send(Command::CheckOnce)
    }

    pub async fn status(&self) -> Result<MonitorStatus> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Status(tx))?;
        rx.await.map_err(|_| MonitorError::ControllerClosed)
    }
}
