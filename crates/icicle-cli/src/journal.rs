//! Append-only upload journal
//!
//! Three files under the journal directory:
//!   parts.log      `{unix_ts} {LEVEL} {message}` per session step
//!   responses.log  `{unix_ts} {op} {json}` per remote reply
//!   archives.log   `{unix_ts}\t{filename}\t{archive_id}` per completed archive

use anyhow::{Context, Result};
use icicle_upload::{TracingObserver, UploadEvent, UploadObserver};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

pub const PARTS_LOG: &str = "parts.log";
pub const RESPONSES_LOG: &str = "responses.log";
pub const ARCHIVES_LOG: &str = "archives.log";

struct Files {
    parts: File,
    responses: File,
    archives: File,
}

/// Writes every event to the journal files and forwards it to `tracing`.
pub struct JournalObserver {
    files: Mutex<Files>,
    tracing: TracingObserver,
}

impl JournalObserver {
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating journal dir: {}", dir.display()))?;
        let open = |name: &str| -> Result<File> {
            let path = dir.join(name);
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("opening journal: {}", path.display()))
        };
        Ok(Self {
            files: Mutex::new(Files {
                parts: open(PARTS_LOG)?,
                responses: open(RESPONSES_LOG)?,
                archives: open(ARCHIVES_LOG)?,
            }),
            tracing: TracingObserver,
        })
    }

    fn record(&self, event: &UploadEvent<'_>) -> std::io::Result<()> {
        let ts = unix_ts();
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());

        match event {
            UploadEvent::SessionStarted { session, path } => writeln!(
                files.parts,
                "{ts} INFO upload {} started: {} ({} bytes, part size {}, vault {})",
                session.upload_id,
                path.display(),
                session.total_size,
                session.part_size,
                session.vault
            ),
            UploadEvent::PartUploaded { session, part, .. } => writeln!(
                files.parts,
                "{ts} INFO upload {} part {} {} {}",
                session.upload_id,
                part.index,
                part.range.content_range(),
                part.hash
            ),
            UploadEvent::RemoteResponse { op, body, .. } => {
                writeln!(files.responses, "{ts} {op} {body}")
            }
            UploadEvent::Verified {
                upload_id,
                combined,
                whole,
            } => {
                if combined == whole {
                    writeln!(files.parts, "{ts} INFO upload {upload_id} verified {combined}")
                } else {
                    writeln!(
                        files.parts,
                        "{ts} ERROR upload {upload_id} tree hash mismatch: \
                         parts {combined}, file {whole}"
                    )
                }
            }
            UploadEvent::SessionCompleted {
                session,
                path,
                receipt,
            } => {
                writeln!(
                    files.parts,
                    "{ts} INFO upload {} completed: archive {}",
                    session.upload_id, receipt.archive_id
                )?;
                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy())
                    .unwrap_or_else(|| path.to_string_lossy());
                writeln!(files.archives, "{ts}\t{filename}\t{}", receipt.archive_id)
            }
            UploadEvent::SessionAborted {
                upload_id,
                reason,
                cleanup_error,
                ..
            } => {
                writeln!(files.parts, "{ts} WARNING upload {upload_id} aborted: {reason}")?;
                match cleanup_error {
                    Some(err) => writeln!(
                        files.parts,
                        "{ts} ERROR upload {upload_id} abort failed: {err}"
                    ),
                    None => Ok(()),
                }
            }
        }
    }
}

impl UploadObserver for JournalObserver {
    fn on_event(&self, event: &UploadEvent<'_>) {
        self.tracing.on_event(event);
        if let Err(e) = self.record(event) {
            tracing::warn!(event = event.kind(), error = %e, "journal write failed");
        }
    }
}

fn unix_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
