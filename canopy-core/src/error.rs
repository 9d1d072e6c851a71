use std::time::Duration;

use thiserror::Error;

use crate::regions::FanOutError;

#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("fetcher {0} is already registered")]
    DuplicateKey(String),

    #[error("fetcher {0} not found")]
    NotFound(String),

    #[error("fetcher {fetcher} reached a timeout after {} seconds", after.as_secs_f64())]
    Timeout { fetcher: String, after: Duration },

    #[error("fetcher {0} was cancelled")]
    Cancelled(String),

    #[error("fetcher {fetcher} recovered from panic: {payload}")]
    Panicked { fetcher: String, payload: String },

    #[error("failed to discover regions: {0}")]
    RegionDiscovery(String),

    #[error(transparent)]
    FanOut(#[from] FanOutError),

    #[error("resource output stream is closed")]
    OutputClosed,

    #[error("orchestrator is {actual}, expected {expected}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Model error: {0}")]
    Model(#[from] canopy_model::ModelError),

    #[error(transparent)]
    Fetcher(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CollectorError>;
