use std::path::PathBuf;
use thiserror::Error;

use crate::types::RemoteOp;

pub type IcicleResult<T> = Result<T, IcicleError>;

#[derive(Debug, Error)]
pub enum IcicleError {
    #[error("invalid hash source: {0}")]
    InvalidSourceKind(String),

    #[error("cannot combine an empty list of hashes")]
    EmptyInput,

    #[error("{op} failed: {reason}")]
    UploadFailed { op: RemoteOp, reason: String },

    #[error("tree hash mismatch: parts combine to {combined}, file hashes to {whole}")]
    VerificationMismatch { combined: String, whole: String },

    #[error("refusing to upload empty file: {}", .0.display())]
    EmptyFile(PathBuf),

    #[error("source changed during upload: {0}")]
    SourceChanged(String),

    #[error("invalid part size {0}: must be a power of two between 1 MiB and 4 GiB")]
    InvalidPartSize(u64),

    #[error("invalid byte range: {0}")]
    InvalidRange(String),

    #[error("upload has already run")]
    AlreadyRun,

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl IcicleError {
    /// Wrap a remote-call failure, keeping the full anyhow context chain.
    pub fn upload_failed(op: RemoteOp, err: anyhow::Error) -> Self {
        IcicleError::UploadFailed {
            op,
            reason: format!("{err:#}"),
        }
    }
}
