//! Shared fixtures for upload integration tests
#![allow(dead_code)]

use anyhow::{bail, Result};
use icicle_core::{ByteRange, PartSize, RemoteOp};
use icicle_upload::{UploadEvent, UploadObserver};
use icicle_vault::{ArchiveReceipt, MemoryVault, PartReceipt, UploadSummary, VaultOps};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub const MIB: u64 = 1024 * 1024;

pub fn mib_parts() -> PartSize {
    PartSize::new(MIB).unwrap()
}

/// Deterministic, non-repeating-per-leaf content
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| ((i * 31) ^ (i >> 11)) as u8)
        .collect()
}

pub fn write_file(dir: &Path, name: &str, len: usize) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, pattern(len)).unwrap();
    path
}

#[derive(Default)]
pub struct Calls {
    pub initiate: AtomicUsize,
    pub upload_part: AtomicUsize,
    pub complete: AtomicUsize,
    pub abort: AtomicUsize,
    pub list: AtomicUsize,
}

impl Calls {
    fn bump(counter: &AtomicUsize) -> usize {
        counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// `MemoryVault` with injectable failures and call counters
#[derive(Default)]
pub struct FlakyVault {
    pub inner: MemoryVault,
    pub fail_initiate: bool,
    /// 1-based `upload_part` call that fails
    pub fail_part: Option<usize>,
    pub fail_complete: bool,
    pub fail_abort: bool,
    pub fail_list: bool,
    /// Upload ids whose abort fails
    pub fail_abort_for: Vec<String>,
    pub calls: Calls,
}

impl FlakyVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, counter: impl Fn(&Calls) -> &AtomicUsize) -> usize {
        counter(&self.calls).load(Ordering::SeqCst)
    }
}

impl VaultOps for FlakyVault {
    async fn initiate_upload(
        &self,
        vault: &str,
        description: &str,
        part_size: PartSize,
    ) -> Result<String> {
        Calls::bump(&self.calls.initiate);
        if self.fail_initiate {
            bail!("503 service unavailable");
        }
        self.inner.initiate_upload(vault, description, part_size).await
    }

    async fn upload_part(
        &self,
        vault: &str,
        upload_id: &str,
        checksum: &str,
        range: ByteRange,
        body: &[u8],
    ) -> Result<PartReceipt> {
        let n = Calls::bump(&self.calls.upload_part);
        if self.fail_part == Some(n) {
            bail!("connection reset by peer");
        }
        self.inner
            .upload_part(vault, upload_id, checksum, range, body)
            .await
    }

    async fn complete_upload(
        &self,
        vault: &str,
        upload_id: &str,
        checksum: &str,
        archive_size: u64,
    ) -> Result<ArchiveReceipt> {
        Calls::bump(&self.calls.complete);
        if self.fail_complete {
            bail!("500 internal error");
        }
        self.inner
            .complete_upload(vault, upload_id, checksum, archive_size)
            .await
    }

    async fn abort_upload(&self, vault: &str, upload_id: &str) -> Result<()> {
        Calls::bump(&self.calls.abort);
        if self.fail_abort || self.fail_abort_for.iter().any(|id| id == upload_id) {
            bail!("abort refused");
        }
        self.inner.abort_upload(vault, upload_id).await
    }

    async fn list_uploads(&self, vault: &str) -> Result<Vec<UploadSummary>> {
        Calls::bump(&self.calls.list);
        if self.fail_list {
            bail!("403 forbidden");
        }
        self.inner.list_uploads(vault).await
    }
}

/// Keeps the kind of every event plus abort details
#[derive(Default)]
pub struct RecordingObserver {
    pub kinds: Mutex<Vec<&'static str>>,
    pub cleanup_errors: Mutex<Vec<Option<String>>>,
    pub aborted_ids: Mutex<Vec<String>>,
    /// (op, raw body) of every remote reply
    pub responses: Mutex<Vec<(RemoteOp, String)>>,
}

impl RecordingObserver {
    pub fn kinds(&self) -> Vec<&'static str> {
        self.kinds.lock().unwrap().clone()
    }
}

impl UploadObserver for RecordingObserver {
    fn on_event(&self, event: &UploadEvent<'_>) {
        self.kinds.lock().unwrap().push(event.kind());
        if let UploadEvent::RemoteResponse { op, body, .. } = event {
            self.responses.lock().unwrap().push((*op, body.to_string()));
        }
        if let UploadEvent::SessionAborted {
            upload_id,
            cleanup_error,
            ..
        } = event
        {
            self.aborted_ids.lock().unwrap().push(upload_id.to_string());
            self.cleanup_errors
                .lock()
                .unwrap()
                .push(cleanup_error.map(str::to_string));
        }
    }
}

/// Runs `touch` once, right after the first part is acknowledged
pub struct TamperAfterFirstPart<F: Fn() + Send + Sync> {
    pub touch: F,
}

impl<F: Fn() + Send + Sync> UploadObserver for TamperAfterFirstPart<F> {
    fn on_event(&self, event: &UploadEvent<'_>) {
        if let UploadEvent::PartUploaded { part, .. } = event {
            if part.index == 0 {
                (self.touch)();
            }
        }
    }
}

/// Flip the first byte of `path` without changing its length
pub fn overwrite_first_byte(path: &Path) {
    use std::io::{Seek, SeekFrom, Write};
    let first = std::fs::read(path).unwrap()[0];
    let mut f = std::fs::OpenOptions::new().write(true).open(path).unwrap();
    f.seek(SeekFrom::Start(0)).unwrap();
    f.write_all(&[first ^ 0xff]).unwrap();
}

pub fn append_bytes(path: &Path, extra: &[u8]) {
    use std::io::Write;
    let mut f = std::fs::OpenOptions::new().append(true).open(path).unwrap();
    f.write_all(extra).unwrap();
}
