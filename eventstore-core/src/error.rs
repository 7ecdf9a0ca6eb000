use miette::Diagnostic;
use thiserror::Error;

/// Errors surfaced by the read façade.
///
/// `ExpiryPurgeFailed` is deliberately absent here: a failed
/// `purge_expired_message` call is logged by the expiry filter and never
/// propagated to the caller.
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("invalid argument: {0}")]
    ArgumentError(String),

    #[error("operation attempted on a disposed store")]
    ObjectDisposed,

    #[error("operation was cancelled")]
    Cancelled,

    #[error("storage engine error")]
    Engine(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub fn engine<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
        StoreError::Engine(Box::new(err))
    }
}
