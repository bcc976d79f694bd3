//! Abort every open multipart session in a vault
//!
//! Sessions are left open when a process dies mid-upload. They hold
//! server-side storage until aborted.

use icicle_core::{IcicleError, IcicleResult, RemoteOp};
use icicle_vault::VaultOps;
use tracing::{info, warn};

use crate::observer::{UploadEvent, UploadObserver};
use crate::orchestrator::report_abort;

const REASON: &str = "orphaned session cleanup";

/// Outcome of `abort_all_uploads`
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AbortSummary {
    pub aborted: Vec<String>,
    /// (upload id, error)
    pub failed: Vec<(String, String)>,
}

impl AbortSummary {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// List the open sessions of `vault` and abort each one.
///
/// A failed abort is recorded and the sweep moves on; only a failed listing
/// is an error.
pub async fn abort_all_uploads<V: VaultOps>(
    ops: &V,
    vault: &str,
    observer: &dyn UploadObserver,
) -> IcicleResult<AbortSummary> {
    let open = ops
        .list_uploads(vault)
        .await
        .map_err(|e| IcicleError::upload_failed(RemoteOp::List, e))?;
    info!(vault, open = open.len(), "aborting open uploads");

    let mut summary = AbortSummary::default();
    for upload in open {
        let result = ops.abort_upload(vault, &upload.upload_id).await;
        let cleanup_error = result.as_ref().err().map(|e| format!("{e:#}"));
        report_abort(observer, &upload.upload_id, cleanup_error.as_deref());

        observer.on_event(&UploadEvent::SessionAborted {
            vault,
            upload_id: &upload.upload_id,
            reason: REASON,
            cleanup_error: cleanup_error.as_deref(),
        });

        match cleanup_error {
            None => summary.aborted.push(upload.upload_id),
            Some(err) => {
                warn!(vault, upload_id = %upload.upload_id, error = %err, "abort failed");
                summary.failed.push((upload.upload_id, err));
            }
        }
    }
    Ok(summary)
}
