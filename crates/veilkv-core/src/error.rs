use thiserror::Error;

pub type VeilResult<T> = Result<T, VeilError>;

#[derive(Debug, Error)]
pub enum VeilError {
    /// Operation attempted before the session finished initializing.
    /// Resolved internally by auto-loading; callers should never see this.
    #[error("database not loaded")]
    NotLoaded,

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("malformed record payload: {0}")]
    MalformedPayload(String),

    /// A concurrent load did not reach the ready state within the deadline.
    #[error("load did not complete within {0} ms")]
    LoadTimeout(u64),

    /// Propagated unchanged from the physical backend; retry policy is the
    /// caller's responsibility.
    #[error("backend error: {0}")]
    Backend(#[from] opendal::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
