/// Errors produced by digest operations.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("not a digest: {0:?} (want 40 hex characters)")]
    MalformedHex(String),

    #[error("digest must be 20 bytes, got {0}")]
    WrongLength(usize),

    #[error("non-monotonic fanout table at byte {0:#04x}")]
    NonMonotonicFanout(u8),
}
