//! Error types for autoworker.
//!
//! Two families: [`Failure`] is what a single work item can end in and is
//! only ever delivered through that item's [`WorkerResult`](crate::WorkerResult).
//! [`Error`] covers everything around the dispatcher (config, telemetry, I/O).

use thiserror::Error;

/// Why a work item did not produce a value.
#[derive(Debug, Error)]
pub enum Failure {
    /// The processing function returned an error. Carried unmodified.
    #[error("processing failed: {0}")]
    Process(#[source] anyhow::Error),

    /// The processing function panicked. The drain loop survives it.
    #[error("processing panicked: {0}")]
    Panicked(String),

    /// The item was dropped before it could be resolved, e.g. the runtime
    /// shut down with the item still queued.
    #[error("work item abandoned before completion")]
    Abandoned,
}

impl Failure {
    /// The underlying processing error, if this failure came from one.
    pub fn process_error(&self) -> Option<&anyhow::Error> {
        match self {
            Failure::Process(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
