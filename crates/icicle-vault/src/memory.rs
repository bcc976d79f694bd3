//! In-process vault
//!
//! Behaves like the remote archival service: parts are validated as they
//! arrive, and completion re-checks the part layout and the archive tree hash
//! before the archive is stored.

use anyhow::{anyhow, Result};
use icicle_core::{ByteRange, PartSize};
use icicle_treehash::{combine, TreeHash};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::ops::{ArchiveReceipt, PartReceipt, UploadSummary, VaultOps};
use crate::protocol::{check_archive_hash, check_layout, check_part, new_id, unix_now};

struct OpenUpload {
    description: String,
    part_size: PartSize,
    created: u64,
    /// Keyed by range start; a re-sent part replaces the earlier one
    parts: BTreeMap<u64, StoredPart>,
}

struct StoredPart {
    range: ByteRange,
    hash: TreeHash,
    body: Vec<u8>,
}

/// A stored archive
#[derive(Debug, Clone)]
pub struct Archive {
    pub description: String,
    pub checksum: String,
    pub body: Vec<u8>,
    pub created: u64,
}

#[derive(Default)]
struct VaultState {
    uploads: HashMap<String, OpenUpload>,
    archives: HashMap<String, Archive>,
}

/// Vaults are created on first use.
#[derive(Default)]
pub struct MemoryVault {
    vaults: Mutex<HashMap<String, VaultState>>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a completed archive
    pub fn archive(&self, vault: &str, archive_id: &str) -> Option<Archive> {
        self.lock()
            .get(vault)
            .and_then(|v| v.archives.get(archive_id))
            .cloned()
    }

    pub fn archive_count(&self, vault: &str) -> usize {
        self.lock().get(vault).map_or(0, |v| v.archives.len())
    }

    pub fn open_upload_count(&self, vault: &str) -> usize {
        self.lock().get(vault).map_or(0, |v| v.uploads.len())
    }

    /// Number of parts received so far for an open upload
    pub fn part_count(&self, vault: &str, upload_id: &str) -> Option<usize> {
        self.lock()
            .get(vault)
            .and_then(|v| v.uploads.get(upload_id))
            .map(|u| u.parts.len())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, VaultState>> {
        // A panic while holding the lock leaves plain data behind; keep serving it.
        self.vaults.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn open_upload<'a>(
    vaults: &'a mut HashMap<String, VaultState>,
    vault: &str,
    upload_id: &str,
) -> Result<&'a mut OpenUpload> {
    vaults
        .get_mut(vault)
        .and_then(|v| v.uploads.get_mut(upload_id))
        .ok_or_else(|| anyhow!("no open upload {upload_id} in vault {vault}"))
}

impl VaultOps for MemoryVault {
    async fn initiate_upload(
        &self,
        vault: &str,
        description: &str,
        part_size: PartSize,
    ) -> Result<String> {
        let upload_id = new_id();
        self.lock().entry(vault.to_string()).or_default().uploads.insert(
            upload_id.clone(),
            OpenUpload {
                description: description.to_string(),
                part_size,
                created: unix_now(),
                parts: BTreeMap::new(),
            },
        );
        debug!(
            vault,
            upload_id = %upload_id,
            part_size = part_size.bytes(),
            "memory vault: initiated"
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        vault: &str,
        upload_id: &str,
        checksum: &str,
        range: ByteRange,
        body: &[u8],
    ) -> Result<PartReceipt> {
        let mut vaults = self.lock();
        let upload = open_upload(&mut vaults, vault, upload_id)?;
        let hash = check_part(upload.part_size, range, body, checksum)?;
        upload.parts.insert(
            range.start,
            StoredPart {
                range,
                hash,
                body: body.to_vec(),
            },
        );
        Ok(PartReceipt {
            checksum: hash.to_hex(),
        })
    }

    async fn complete_upload(
        &self,
        vault: &str,
        upload_id: &str,
        checksum: &str,
        archive_size: u64,
    ) -> Result<ArchiveReceipt> {
        let mut vaults = self.lock();
        let upload = open_upload(&mut vaults, vault, upload_id)?;

        let ranges: Vec<ByteRange> = upload.parts.values().map(|p| p.range).collect();
        check_layout(upload.part_size, &ranges, archive_size)?;
        let part_hashes: Vec<TreeHash> = upload.parts.values().map(|p| p.hash).collect();
        check_archive_hash(checksum, &combine(&part_hashes)?)?;

        let state = vaults
            .get_mut(vault)
            .ok_or_else(|| anyhow!("vault {vault} vanished"))?;
        let upload = state
            .uploads
            .remove(upload_id)
            .ok_or_else(|| anyhow!("no open upload {upload_id} in vault {vault}"))?;

        let mut body = Vec::with_capacity(archive_size as usize);
        for part in upload.parts.into_values() {
            body.extend_from_slice(&part.body);
        }

        let archive_id = new_id();
        state.archives.insert(
            archive_id.clone(),
            Archive {
                description: upload.description,
                checksum: checksum.to_string(),
                body,
                created: unix_now(),
            },
        );

        Ok(ArchiveReceipt {
            location: format!("/{vault}/archives/{archive_id}"),
            archive_id,
            checksum: checksum.to_string(),
            size: archive_size,
        })
    }

    async fn abort_upload(&self, vault: &str, upload_id: &str) -> Result<()> {
        self.lock()
            .get_mut(vault)
            .and_then(|v| v.uploads.remove(upload_id))
            .map(|_| ())
            .ok_or_else(|| anyhow!("no open upload {upload_id} in vault {vault}"))
    }

    async fn list_uploads(&self, vault: &str) -> Result<Vec<UploadSummary>> {
        let vaults = self.lock();
        let mut out: Vec<UploadSummary> = vaults
            .get(vault)
            .map(|v| {
                v.uploads
                    .iter()
                    .map(|(id, u)| UploadSummary {
                        upload_id: id.clone(),
                        description: u.description.clone(),
                        part_size: u.part_size.bytes(),
                        created: u.created,
                    })
                    .collect()
            })
            .unwrap_or_default();
        out.sort_by(|a, b| (a.created, &a.upload_id).cmp(&(b.created, &b.upload_id)));
        Ok(out)
    }
}
