//! Error taxonomy for batch analysis runs
//!
//! Errors raised inside a single batch are [`AnalysisError`]s. The scheduler wraps the
//! first one it sees in a [`BatchFailure`] that records where in the input the failing
//! batch started, and aborts the run with [`RunError::Batch`]. Nothing is retried.

use std::time::Duration;
use thiserror::Error;

/// Failure of one analysis call, local or remote
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// The request body was not a non-empty JSON array of events
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Every submitted record failed validation
    #[error("batch contains no valid listening events ({submitted} submitted)")]
    EmptyBatch { submitted: usize },

    /// The aggregation endpoint could not be reached or answered with an error
    #[error("remote call failed: {0}")]
    RemoteCall(#[from] RemoteCallError),

    /// Unexpected fault while computing a summary
    #[error("internal computation error: {0}")]
    Internal(String),
}

impl AnalysisError {
    /// HTTP status the aggregation endpoint answers with for this error
    pub fn status_code(&self) -> u16 {
        match self {
            AnalysisError::MalformedRequest(_) | AnalysisError::EmptyBatch { .. } => 400,
            AnalysisError::RemoteCall(_) => 502,
            AnalysisError::Internal(_) => 500,
        }
    }

    /// Whether the caller, rather than the service, caused the failure
    pub fn is_client_error(&self) -> bool {
        self.status_code() == 400
    }
}

#[derive(Error, Debug)]
pub enum RemoteCallError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("endpoint answered {status}: {message}")]
    Status { status: u16, message: String },

    #[error("undecodable response: {0}")]
    Decode(String),
}

/// The batch that aborted a run, and why
#[derive(Error, Debug)]
#[error("batch {index} (offset {offset}, {len} records) failed: {cause}")]
pub struct BatchFailure {
    pub index: usize,
    pub offset: usize,
    pub len: usize,
    #[source]
    pub cause: AnalysisError,
}

#[derive(Error, Debug)]
pub enum RunError {
    #[error("invalid scheduler options: {0}")]
    InvalidOptions(String),

    #[error(transparent)]
    Batch(#[from] BatchFailure),
}

impl RunError {
    /// The failing batch, if the run got as far as dispatching
    pub fn batch_failure(&self) -> Option<&BatchFailure> {
        match self {
            RunError::Batch(failure) => Some(failure),
            RunError::InvalidOptions(_) => None,
        }
    }
}
