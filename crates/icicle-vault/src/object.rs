//! Vault persisted through an OpenDAL operator
//!
//! Layout under the operator root:
//!   {vault}/uploads/{upload_id}/meta.json
//!   {vault}/uploads/{upload_id}/parts/{start:020}-{end:020}.{tree_hash}
//!   {vault}/archives/{archive_id}
//!   {vault}/archives/{archive_id}.json
//!
//! Part hashes are verified on upload and carried in the object name, so
//! completion checks the archive checksum before writing anything and then
//! streams parts into the archive object one at a time.

use anyhow::{anyhow, bail, Context, Result};
use icicle_core::{ByteRange, PartSize};
use icicle_treehash::{combine, TreeHash};
use opendal::Operator;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ops::{ArchiveReceipt, PartReceipt, UploadSummary, VaultOps};
use crate::protocol::{check_archive_hash, check_layout, check_part, new_id, unix_now};

/// Buffer size for the archive writer; S3 rejects multipart chunks under 5 MiB
const WRITE_CHUNK: usize = 8 * 1024 * 1024;

#[derive(Debug, Serialize, Deserialize)]
struct UploadMeta {
    description: String,
    part_size: PartSize,
    created: u64,
}

/// Metadata stored next to each archive object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveMeta {
    pub description: String,
    pub checksum: String,
    pub size: u64,
    pub created: u64,
}

pub struct ObjectVault {
    op: Operator,
}

impl ObjectVault {
    pub fn new(op: Operator) -> Self {
        Self { op }
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    /// Read back a completed archive's bytes
    pub async fn read_archive(&self, vault: &str, archive_id: &str) -> Result<Vec<u8>> {
        let path = archive_path(vault, archive_id);
        let buf = self
            .op
            .read(&path)
            .await
            .with_context(|| format!("reading archive {path}"))?;
        Ok(buf.to_vec())
    }

    pub async fn archive_meta(&self, vault: &str, archive_id: &str) -> Result<ArchiveMeta> {
        let path = format!("{}.json", archive_path(vault, archive_id));
        let buf = self
            .op
            .read(&path)
            .await
            .with_context(|| format!("reading archive metadata {path}"))?;
        serde_json::from_slice(&buf.to_vec()).context("parsing archive metadata")
    }

    async fn load_meta(&self, vault: &str, upload_id: &str) -> Result<UploadMeta> {
        let path = meta_path(vault, upload_id);
        if !self.op.exists(&path).await? {
            bail!("no open upload {upload_id} in vault {vault}");
        }
        let buf = self
            .op
            .read(&path)
            .await
            .with_context(|| format!("reading upload metadata {path}"))?;
        serde_json::from_slice(&buf.to_vec()).context("parsing upload metadata")
    }

    /// Parts of an upload, sorted by offset
    async fn list_parts(&self, vault: &str, upload_id: &str) -> Result<Vec<(ByteRange, TreeHash)>> {
        let dir = format!("{}parts/", upload_dir(vault, upload_id));
        let entries = self
            .op
            .list_with(&dir)
            .recursive(true)
            .await
            .with_context(|| format!("listing parts under {dir}"))?;

        let mut parts = Vec::new();
        for entry in entries {
            if !entry.metadata().is_file() {
                continue;
            }
            parts.push(parse_part_name(entry.name())?);
        }
        parts.sort_by_key(|(r, _)| r.start);
        Ok(parts)
    }

    async fn remove_upload(&self, vault: &str, upload_id: &str) -> Result<()> {
        let dir = upload_dir(vault, upload_id);
        let entries = self
            .op
            .list_with(&dir)
            .recursive(true)
            .await
            .with_context(|| format!("listing {dir}"))?;
        for entry in entries {
            if entry.metadata().is_file() {
                self.op
                    .delete(entry.path())
                    .await
                    .with_context(|| format!("deleting {}", entry.path()))?;
            }
        }
        Ok(())
    }
}

fn upload_dir(vault: &str, upload_id: &str) -> String {
    format!("{vault}/uploads/{upload_id}/")
}

fn meta_path(vault: &str, upload_id: &str) -> String {
    format!("{}meta.json", upload_dir(vault, upload_id))
}

fn part_path(vault: &str, upload_id: &str, range: ByteRange, hash: &TreeHash) -> String {
    format!(
        "{}parts/{:020}-{:020}.{hash}",
        upload_dir(vault, upload_id),
        range.start,
        range.end
    )
}

fn archive_path(vault: &str, archive_id: &str) -> String {
    format!("{vault}/archives/{archive_id}")
}

fn parse_part_name(name: &str) -> Result<(ByteRange, TreeHash)> {
    let unexpected = || anyhow!("unexpected part object name '{name}'");
    let (span, hash) = name.split_once('.').ok_or_else(unexpected)?;
    let (start, end) = span.split_once('-').ok_or_else(unexpected)?;
    let start: u64 = start
        .parse()
        .with_context(|| format!("part object name '{name}'"))?;
    let end: u64 = end
        .parse()
        .with_context(|| format!("part object name '{name}'"))?;
    Ok((ByteRange::new(start, end)?, TreeHash::from_hex(hash)?))
}

impl VaultOps for ObjectVault {
    async fn initiate_upload(
        &self,
        vault: &str,
        description: &str,
        part_size: PartSize,
    ) -> Result<String> {
        let upload_id = new_id();
        let meta = UploadMeta {
            description: description.to_string(),
            part_size,
            created: unix_now(),
        };
        let path = meta_path(vault, &upload_id);
        self.op
            .write(&path, serde_json::to_vec(&meta)?)
            .await
            .with_context(|| format!("writing upload metadata {path}"))?;
        debug!(vault, upload_id = %upload_id, "object vault: initiated");
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
        let meta = self.load_meta(vault, upload_id).await?;
        let hash = check_part(meta.part_size, range, body, checksum)?;

        // A re-sent part replaces whatever was stored at the same offset
        for (old_range, old_hash) in self.list_parts(vault, upload_id).await? {
            if old_range.start == range.start {
                let old = part_path(vault, upload_id, old_range, &old_hash);
                self.op
                    .delete(&old)
                    .await
                    .with_context(|| format!("replacing part {old}"))?;
            }
        }

        let path = part_path(vault, upload_id, range, &hash);
        self.op
            .write(&path, body.to_vec())
            .await
            .with_context(|| format!("writing part {path}"))?;

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
        let meta = self.load_meta(vault, upload_id).await?;
        let parts = self.list_parts(vault, upload_id).await?;
        let ranges: Vec<ByteRange> = parts.iter().map(|(r, _)| *r).collect();
        check_layout(meta.part_size, &ranges, archive_size)?;
        let part_hashes: Vec<TreeHash> = parts.iter().map(|(_, h)| *h).collect();
        check_archive_hash(checksum, &combine(&part_hashes)?)?;

        let archive_id = new_id();
        let path = archive_path(vault, &archive_id);
        let mut writer = self
            .op
            .writer_with(&path)
            .chunk(WRITE_CHUNK)
            .await
            .with_context(|| format!("opening archive writer {path}"))?;

        for (range, hash) in &parts {
            let part = self
                .op
                .read(&part_path(vault, upload_id, *range, hash))
                .await
                .with_context(|| format!("reading part {}", range.content_range()))?;
            writer.write(part).await?;
        }
        writer.close().await?;

        let archive_meta = ArchiveMeta {
            description: meta.description,
            checksum: checksum.to_string(),
            size: archive_size,
            created: unix_now(),
        };
        self.op
            .write(&format!("{path}.json"), serde_json::to_vec(&archive_meta)?)
            .await
            .context("writing archive metadata")?;

        self.remove_upload(vault, upload_id).await?;
        info!(
            vault,
            upload_id,
            archive_id = %archive_id,
            size = archive_size,
            "object vault: archive stored"
        );

        Ok(ArchiveReceipt {
            location: format!("/{path}"),
            archive_id,
            checksum: checksum.to_string(),
            size: archive_size,
        })
    }

    async fn abort_upload(&self, vault: &str, upload_id: &str) -> Result<()> {
        if !self.op.exists(&meta_path(vault, upload_id)).await? {
            bail!("no open upload {upload_id} in vault {vault}");
        }
        self.remove_upload(vault, upload_id).await
    }

    async fn list_uploads(&self, vault: &str) -> Result<Vec<UploadSummary>> {
        let dir = format!("{vault}/uploads/");
        let entries = self
            .op
            .list_with(&dir)
            .recursive(true)
            .await
            .with_context(|| format!("listing {dir}"))?;

        let mut out = Vec::new();
        for entry in entries {
            let Some(upload_id) = entry
                .path()
                .strip_prefix(&dir)
                .and_then(|rest| rest.strip_suffix("/meta.json"))
            else {
                continue;
            };
            let meta = self.load_meta(vault, upload_id).await?;
            out.push(UploadSummary {
                upload_id: upload_id.to_string(),
                description: meta.description,
                part_size: meta.part_size.bytes(),
                created: meta.created,
            });
        }
        out.sort_by(|a, b| (a.created, &a.upload_id).cmp(&(b.created, &b.upload_id)));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use icicle_treehash::tree_hash_bytes;

    #[test]
    fn part_names_sort_by_offset() {
        let h = tree_hash_bytes(b"x");
        let a = part_path("v", "u", ByteRange::new(0, 1048576).unwrap(), &h);
        let b = part_path("v", "u", ByteRange::new(1048576, 2097152).unwrap(), &h);
        let c = part_path("v", "u", ByteRange::new(10485760, 10485770).unwrap(), &h);
        assert!(a < b && b < c, "zero padding keeps lexical order = offset order");
    }

    #[test]
    fn parse_part_name_roundtrip() {
        let r = ByteRange::new(2097152, 3145728).unwrap();
        let h = tree_hash_bytes(b"part body");
        let path = part_path("v", "u", r, &h);
        let name = path.rsplit('/').next().unwrap();
        assert_eq!(parse_part_name(name).unwrap(), (r, h));
        assert!(parse_part_name("garbage").is_err());
        assert!(parse_part_name("00000000000000000000-00000000000000000010.nothex").is_err());
    }
}
