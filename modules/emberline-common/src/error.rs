use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmberlineError {
    /// The window and filters produced nothing. Not exceptional: callers
    /// treat this as an empty result.
    #[error("no trending candidates in window")]
    NoCandidates,

    /// A referenced document vanished between read and use. Recovered
    /// locally by retry-with-exclusion or silent drop.
    #[error("document not found: {0}")]
    NotFound(String),

    /// Concurrent mutation detected by the store's version check.
    /// Recovered locally by retry-with-exclusion.
    #[error("version conflict on document: {0}")]
    VersionConflict(String),

    /// Transport-level store failure. Propagated uncaught; logical
    /// conflicts are retried here, transport failures are not.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The dequeue loop hit its retry ceiling under a conflict storm.
    /// Retryable by the caller.
    #[error("dequeue gave up after {0} attempts")]
    RetriesExhausted(usize),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
