use thiserror::Error;

/// Why a capture stream could not be acquired.
///
/// `PermissionDenied` and `Unsupported` are distinguished so the embedding
/// screen can route the user to a remediation flow instead of a generic
/// failure; everything else is a plain fault.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("screen capture permission denied")]
    PermissionDenied,

    #[error("screen capture unsupported: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
