//! Multipart session bookkeeping

use icicle_core::{ByteRange, IcicleResult, PartSize};
use icicle_treehash::{combine, TreeHash};
use serde::Serialize;

/// One uploaded part. Immutable once recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PartRecord {
    /// 0-based position in the upload
    pub index: u64,
    pub range: ByteRange,
    /// Locally computed tree hash of the part
    pub hash: TreeHash,
}

/// An open multipart upload and the parts recorded so far
#[derive(Debug, Clone, Serialize)]
pub struct UploadSession {
    pub upload_id: String,
    pub vault: String,
    pub description: String,
    pub part_size: PartSize,
    /// Size of the file when the session started
    pub total_size: u64,
    parts: Vec<PartRecord>,
}

impl UploadSession {
    pub fn new(
        upload_id: String,
        vault: String,
        description: String,
        part_size: PartSize,
        total_size: u64,
    ) -> Self {
        Self {
            upload_id,
            vault,
            description,
            part_size,
            total_size,
            parts: Vec::new(),
        }
    }

    /// Parts in upload order
    pub fn parts(&self) -> &[PartRecord] {
        &self.parts
    }

    /// Offset where the next part must start
    pub fn next_offset(&self) -> u64 {
        self.parts.last().map_or(0, |p| p.range.end)
    }

    pub fn uploaded_bytes(&self) -> u64 {
        self.next_offset()
    }

    /// Record the next part. Parts must arrive contiguously from offset 0.
    pub(crate) fn push_part(&mut self, range: ByteRange, hash: TreeHash) -> PartRecord {
        debug_assert_eq!(range.start, self.next_offset(), "parts must be contiguous");
        let record = PartRecord {
            index: self.parts.len() as u64,
            range,
            hash,
        };
        self.parts.push(record);
        record
    }

    /// Root of the tree formed by the recorded part hashes.
    ///
    /// Fails with `EmptyInput` before any part is recorded.
    pub fn combined_hash(&self) -> IcicleResult<TreeHash> {
        let hashes: Vec<TreeHash> = self.parts.iter().map(|p| p.hash).collect();
        combine(&hashes)
    }
}
