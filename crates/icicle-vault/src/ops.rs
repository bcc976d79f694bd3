//! Remote operations consumed by the upload core

use anyhow::Result;
use icicle_core::{ByteRange, PartSize};
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Reply to a part upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartReceipt {
    /// Tree hash of the part as computed by the vault (hex)
    pub checksum: String,
}

/// Reply to a completed multipart upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveReceipt {
    pub archive_id: String,
    /// Tree hash of the whole archive (hex)
    pub checksum: String,
    /// Vault-relative location of the archive
    pub location: String,
    pub size: u64,
}

/// An open multipart upload as reported by `list_uploads`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSummary {
    pub upload_id: String,
    pub description: String,
    pub part_size: u64,
    /// Unix timestamp of initiation
    pub created: u64,
}

/// The multipart-upload capability of an archival vault.
///
/// Checksums are hex tree hashes. Ranges are half-open; implementations that
/// speak HTTP send them as `ByteRange::content_range()`.
pub trait VaultOps: Send + Sync {
    /// Open a session and return its upload id.
    fn initiate_upload(
        &self,
        vault: &str,
        description: &str,
        part_size: PartSize,
    ) -> impl Future<Output = Result<String>> + Send;

    fn upload_part(
        &self,
        vault: &str,
        upload_id: &str,
        checksum: &str,
        range: ByteRange,
        body: &[u8],
    ) -> impl Future<Output = Result<PartReceipt>> + Send;

    /// Assemble the uploaded parts into an archive of `archive_size` bytes
    /// whose tree hash must equal `checksum`.
    fn complete_upload(
        &self,
        vault: &str,
        upload_id: &str,
        checksum: &str,
        archive_size: u64,
    ) -> impl Future<Output = Result<ArchiveReceipt>> + Send;

    /// Discard a session and all of its parts.
    fn abort_upload(&self, vault: &str, upload_id: &str) -> impl Future<Output = Result<()>> + Send;

    fn list_uploads(&self, vault: &str) -> impl Future<Output = Result<Vec<UploadSummary>>> + Send;
}
