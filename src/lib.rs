//! NetPulse: periodic TCP connect / HTTP HEAD reachability monitor for a
//! single target, with DNS timing and rolling latency statistics.

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod journal;
pub mod models;
pub mod probe;
pub mod stats;
pub mod utils;

pub use config::MonitorConfig;
pub use engine::{MonitorController, MonitorHandle};
pub use error::MonitorError;
pub use models::{MonitorEvent, ProbeMode, ProbeResult, ProbeStatus, Target};
pub use stats::StatsCalculator;
