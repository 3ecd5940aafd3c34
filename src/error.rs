//! Typed error taxonomy for the engine.
//!
//! Dispatchers and the trial executor return [`EngineError`] directly;
//! the public `EngineContext` boundary wraps it in `anyhow::Error` so
//! callers keep using `?` freely while the taxonomy stays inspectable
//! for callers who need to branch on error kind (e.g. distinguishing a
//! fatal backend-init failure from a merely transient send error).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("resource exhausted: {0}")]
    ResourceExhaustion(String),

    #[error("backend init failed: {0}")]
    BackendInit(String),

    #[error("backend transient error: {0}")]
    BackendTransient(String),

    #[error("cancelled")]
    Cancelled,
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Whether the error is fatal to the whole run, vs. scoped to the
    /// current test or counted as a per-worker transient failure.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::BackendInit(_) | EngineError::InvalidState(_)
        )
    }
}
