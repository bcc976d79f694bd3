//! Multipart upload orchestration
//!
//! ```text
//! Idle -> Initiated -> PartsUploading -> Verifying -> Completed
//!            \______________\_______________\____________-> Aborted
//! ```
//!
//! The file must not change while a session is open. Its length and mtime are
//! captured before the first part and re-checked during verification, and the
//! combined part hashes are compared to a fresh whole-file tree hash.

use icicle_core::{IcicleError, IcicleResult, PartSize, RemoteOp};
use icicle_treehash::{tree_hash, HashSource, TreeHash};
use icicle_vault::{ArchiveReceipt, VaultOps};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

use crate::observer::{UploadEvent, UploadObserver};
use crate::parts::upload_parts;
use crate::session::UploadSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    Initiated,
    PartsUploading,
    Verifying,
    Completed,
    Aborted,
}

/// What to upload and where
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub path: PathBuf,
    pub vault: String,
    pub description: String,
    pub part_size: PartSize,
}

/// Length and mtime of the source file at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileSnapshot {
    len: u64,
    modified: Option<SystemTime>,
}

impl FileSnapshot {
    fn capture(path: &Path) -> IcicleResult<Self> {
        let meta = std::fs::metadata(path)?;
        if !meta.is_file() {
            return Err(IcicleError::InvalidSourceKind(format!(
                "{} is not a regular file",
                path.display()
            )));
        }
        Ok(Self {
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

/// One multipart upload of one file. Runs once.
pub struct ArchiveUpload<'a, V: VaultOps> {
    ops: &'a V,
    observer: &'a dyn UploadObserver,
    request: UploadRequest,
    state: UploadState,
    session: Option<UploadSession>,
}

impl<'a, V: VaultOps> ArchiveUpload<'a, V> {
    pub fn new(ops: &'a V, request: UploadRequest, observer: &'a dyn UploadObserver) -> Self {
        Self {
            ops,
            observer,
            request,
            state: UploadState::Idle,
            session: None,
        }
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    /// The remote session, once initiated. Keeps the parts recorded so far
    /// even after a failure.
    pub fn session(&self) -> Option<&UploadSession> {
        self.session.as_ref()
    }

    pub fn request(&self) -> &UploadRequest {
        &self.request
    }

    /// Drive the upload to completion, aborting the remote session on any
    /// failure after initiation.
    pub async fn run(&mut self) -> IcicleResult<ArchiveReceipt> {
        if self.state != UploadState::Idle {
            return Err(IcicleError::AlreadyRun);
        }

        let path = self.request.path.clone();
        let snapshot = FileSnapshot::capture(&path)?;
        if snapshot.len == 0 {
            return Err(IcicleError::EmptyFile(path));
        }

        let upload_id = self
            .ops
            .initiate_upload(
                &self.request.vault,
                &self.request.description,
                self.request.part_size,
            )
            .await
            .map_err(|e| IcicleError::upload_failed(RemoteOp::Initiate, e))?;

        let body = serde_json::json!({ "upload_id": upload_id }).to_string();
        self.observer.on_event(&UploadEvent::RemoteResponse {
            op: RemoteOp::Initiate,
            upload_id: &upload_id,
            body: &body,
        });

        self.state = UploadState::Initiated;
        let session = self.session.insert(UploadSession::new(
            upload_id,
            self.request.vault.clone(),
            self.request.description.clone(),
            self.request.part_size,
            snapshot.len,
        ));
        self.observer.on_event(&UploadEvent::SessionStarted {
            session: &*session,
            path: &path,
        });

        let outcome = drive(
            self.ops,
            self.observer,
            &path,
            snapshot,
            session,
            &mut self.state,
        )
        .await;

        match outcome {
            Ok(receipt) => {
                self.state = UploadState::Completed;
                self.observer.on_event(&UploadEvent::SessionCompleted {
                    session: &*session,
                    path: &path,
                    receipt: &receipt,
                });
                Ok(receipt)
            }
            Err(err) => {
                self.state = UploadState::Aborted;
                abort_session(self.ops, self.observer, session, &err).await;
                Err(err)
            }
        }
    }
}

/// Initiated → PartsUploading → Verifying → complete call
async fn drive<V: VaultOps>(
    ops: &V,
    observer: &dyn UploadObserver,
    path: &Path,
    snapshot: FileSnapshot,
    session: &mut UploadSession,
    state: &mut UploadState,
) -> IcicleResult<ArchiveReceipt> {
    *state = UploadState::PartsUploading;
    let parts = upload_parts(ops, path, session, observer).await?;
    debug!(upload_id = %session.upload_id, parts, "all parts uploaded");

    *state = UploadState::Verifying;
    let root = verify(path, snapshot, session, observer)?;
    let checksum = root.to_hex();

    let receipt = ops
        .complete_upload(&session.vault, &session.upload_id, &checksum, session.total_size)
        .await
        .map_err(|e| IcicleError::upload_failed(RemoteOp::Complete, e))?;

    if let Ok(body) = serde_json::to_string(&receipt) {
        observer.on_event(&UploadEvent::RemoteResponse {
            op: RemoteOp::Complete,
            upload_id: &session.upload_id,
            body: &body,
        });
    }
    if receipt.checksum != checksum {
        warn!(
            upload_id = %session.upload_id,
            local = %checksum,
            remote = %receipt.checksum,
            "vault reported a different archive checksum"
        );
    }
    Ok(receipt)
}

/// Compare the combined part root with a fresh whole-file tree hash.
fn verify(
    path: &Path,
    snapshot: FileSnapshot,
    session: &UploadSession,
    observer: &dyn UploadObserver,
) -> IcicleResult<TreeHash> {
    let current = FileSnapshot::capture(path)?;
    if current.len != snapshot.len {
        return Err(IcicleError::SourceChanged(format!(
            "{} was {} bytes when the upload started and is now {} bytes",
            path.display(),
            snapshot.len,
            current.len
        )));
    }
    if session.uploaded_bytes() != session.total_size {
        return Err(IcicleError::SourceChanged(format!(
            "uploaded {} of {} bytes from {}",
            session.uploaded_bytes(),
            session.total_size,
            path.display()
        )));
    }

    let combined = session.combined_hash()?;
    let whole = tree_hash(HashSource::Path(path))?;
    observer.on_event(&UploadEvent::Verified {
        upload_id: &session.upload_id,
        combined: &combined,
        whole: &whole,
    });

    if combined.as_bytes() != whole.as_bytes() {
        return Err(IcicleError::VerificationMismatch {
            combined: combined.to_hex(),
            whole: whole.to_hex(),
        });
    }
    if current.modified != snapshot.modified {
        warn!(
            path = %path.display(),
            "file mtime changed during upload but its content still matches"
        );
    }
    Ok(combined)
}

/// Best-effort remote abort. Never replaces `cause`.
async fn abort_session<V: VaultOps>(
    ops: &V,
    observer: &dyn UploadObserver,
    session: &UploadSession,
    cause: &IcicleError,
) {
    let cleanup = ops
        .abort_upload(&session.vault, &session.upload_id)
        .await
        .map_err(|e| format!("{:#}", IcicleError::upload_failed(RemoteOp::Abort, e)));

    if let Err(err) = &cleanup {
        warn!(upload_id = %session.upload_id, error = %err, "abort failed");
    }
    report_abort(
        observer,
        &session.upload_id,
        cleanup.as_ref().err().map(String::as_str),
    );
    observer.on_event(&UploadEvent::SessionAborted {
        vault: &session.vault,
        upload_id: &session.upload_id,
        reason: &cause.to_string(),
        cleanup_error: cleanup.as_ref().err().map(String::as_str),
    });
}

/// Raw outcome of an abort call, for the response log
pub(crate) fn report_abort(
    observer: &dyn UploadObserver,
    upload_id: &str,
    error: Option<&str>,
) {
    let body = match error {
        None => serde_json::json!({ "upload_id": upload_id, "aborted": true }),
        Some(err) => serde_json::json!({
            "upload_id": upload_id,
            "aborted": false,
            "error": err,
        }),
    }
    .to_string();
    observer.on_event(&UploadEvent::RemoteResponse {
        op: RemoteOp::Abort,
        upload_id,
        body: &body,
    });
}

/// Run a single upload from start to finish.
pub async fn upload_archive<V: VaultOps>(
    ops: &V,
    request: UploadRequest,
    observer: &dyn UploadObserver,
) -> IcicleResult<ArchiveReceipt> {
    ArchiveUpload::new(ops, request, observer).run().await
}
