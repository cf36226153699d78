//! Unified Error Model
use thiserror::Error;

/// Failures outside the per-request stage contract
#[derive(Error, Debug)]
pub enum PromptGateError {
    #[error("CONFIG/{0}")]
    ConfigError(String),

    #[error("WIRING/{0}")]
    WiringError(String),
}
