use std::io;

use thiserror::Error;

/// Failure to turn a submission into an on-disk compilation unit
#[derive(Error, Debug)]
pub enum MaterializationError {
    #[error("source code is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("source code is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error("failed to write compilation unit: {0}")]
    Storage(#[source] io::Error),
}

/// Fault of the grader itself while driving a child process
#[derive(Error, Debug)]
pub enum RunError {
    #[error("run aborted because the grader is shutting down")]
    Cancelled,

    #[error("I/O error while {action}: {source}")]
    Io {
        action: &'static str,
        #[source]
        source: io::Error,
    },
}

impl RunError {
    pub(crate) fn io(action: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| Self::Io { action, source }
    }
}

/// Any fault that stops a submission before a regular verdict is reached
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Materialization(#[from] MaterializationError),

    #[error(transparent)]
    Run(#[from] RunError),
}
