//! Upload events
//!
//! The orchestrator and part uploader report progress through an injected
//! `UploadObserver` instead of writing to global loggers. The surrounding
//! application decides where events go: `tracing`, journal files, telemetry.

use icicle_core::RemoteOp;
use icicle_treehash::TreeHash;
use icicle_vault::ArchiveReceipt;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::session::{PartRecord, UploadSession};

#[derive(Debug)]
pub enum UploadEvent<'a> {
    /// Remote session opened; no parts yet
    SessionStarted {
        session: &'a UploadSession,
        path: &'a Path,
    },
    PartUploaded {
        session: &'a UploadSession,
        part: &'a PartRecord,
        /// Checksum the vault reported for the part (hex)
        remote_checksum: &'a str,
    },
    /// Raw reply of a remote call, serialized as JSON
    RemoteResponse {
        op: RemoteOp,
        upload_id: &'a str,
        body: &'a str,
    },
    /// Combined part root compared with the whole-file root
    Verified {
        upload_id: &'a str,
        combined: &'a TreeHash,
        whole: &'a TreeHash,
    },
    SessionCompleted {
        session: &'a UploadSession,
        path: &'a Path,
        receipt: &'a ArchiveReceipt,
    },
    SessionAborted {
        vault: &'a str,
        upload_id: &'a str,
        reason: &'a str,
        /// Set when the abort call itself failed
        cleanup_error: Option<&'a str>,
    },
}

impl UploadEvent<'_> {
    /// Short stable name, e.g. for journals and tests
    pub fn kind(&self) -> &'static str {
        match self {
            UploadEvent::SessionStarted { .. } => "session-started",
            UploadEvent::PartUploaded { .. } => "part-uploaded",
            UploadEvent::RemoteResponse { .. } => "remote-response",
            UploadEvent::Verified { .. } => "verified",
            UploadEvent::SessionCompleted { .. } => "session-completed",
            UploadEvent::SessionAborted { .. } => "session-aborted",
        }
    }
}

pub trait UploadObserver: Send + Sync {
    fn on_event(&self, event: &UploadEvent<'_>);
}

/// Discards every event
pub struct NoopObserver;

impl UploadObserver for NoopObserver {
    fn on_event(&self, _event: &UploadEvent<'_>) {}
}

/// Routes events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl UploadObserver for TracingObserver {
    fn on_event(&self, event: &UploadEvent<'_>) {
        match event {
            UploadEvent::SessionStarted { session, path } => info!(
                vault = %session.vault,
                upload_id = %session.upload_id,
                path = %path.display(),
                size = session.total_size,
                part_size = session.part_size.bytes(),
                parts = session.part_size.part_count(session.total_size),
                "upload session started"
            ),
            UploadEvent::PartUploaded {
                session,
                part,
                remote_checksum,
            } => info!(
                upload_id = %session.upload_id,
                part = part.index,
                range = %part.range.content_range(),
                checksum = %part.hash,
                remote_checksum = %remote_checksum,
                "part uploaded"
            ),
            UploadEvent::RemoteResponse {
                op,
                upload_id,
                body,
            } => debug!(op = %op, upload_id = %upload_id, body = %body, "remote response"),
            UploadEvent::Verified {
                upload_id,
                combined,
                whole,
            } => {
                if combined == whole {
                    info!(upload_id = %upload_id, tree_hash = %combined, "tree hash verified");
                } else {
                    warn!(
                        upload_id = %upload_id,
                        combined = %combined,
                        whole = %whole,
                        "tree hash verification failed"
                    );
                }
            }
            UploadEvent::SessionCompleted {
                session,
                path,
                receipt,
            } => info!(
                vault = %session.vault,
                upload_id = %session.upload_id,
                path = %path.display(),
                archive_id = %receipt.archive_id,
                checksum = %receipt.checksum,
                "upload completed"
            ),
            UploadEvent::SessionAborted {
                vault,
                upload_id,
                reason,
                cleanup_error,
            } => match cleanup_error {
                None => warn!(
                    vault = %vault,
                    upload_id = %upload_id,
                    reason = %reason,
                    "upload aborted"
                ),
                Some(err) => warn!(
                    vault = %vault,
                    upload_id = %upload_id,
                    reason = %reason,
                    cleanup_error = %err,
                    "upload aborted; remote abort failed, session may still be open"
                ),
            },
        }
    }
}
