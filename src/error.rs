use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("monitor controller is no longer running")]
    ControllerClosed,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
