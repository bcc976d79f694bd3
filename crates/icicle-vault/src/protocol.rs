//! Server-side checks shared by the vault backends

use anyhow::{bail, Result};
use icicle_core::{ByteRange, PartSize};
use icicle_treehash::{tree_hash_bytes, TreeHash};
use std::time::{SystemTime, UNIX_EPOCH};

/// Validate one uploaded part and return its tree hash.
pub(crate) fn check_part(
    part_size: PartSize,
    range: ByteRange,
    body: &[u8],
    checksum: &str,
) -> Result<TreeHash> {
    if range.start % part_size.bytes() != 0 {
        bail!(
            "range {} does not start on a {}-byte part boundary",
            range.content_range(),
            part_size
        );
    }
    if range.len() > part_size.bytes() {
        bail!(
            "range {} is larger than the part size {}",
            range.content_range(),
            part_size
        );
    }
    if range.len() != body.len() as u64 {
        bail!(
            "range {} covers {} bytes but body has {}",
            range.content_range(),
            range.len(),
            body.len()
        );
    }

    let claimed = TreeHash::from_hex(checksum)?;
    let actual = tree_hash_bytes(body);
    if claimed != actual {
        bail!(
            "checksum mismatch for {}: sent {claimed}, body hashes to {actual}",
            range.content_range()
        );
    }
    Ok(actual)
}

/// Check that sorted part ranges tile `[0, archive_size)` with every part but
/// the last exactly `part_size` long.
pub(crate) fn check_layout(
    part_size: PartSize,
    ranges: &[ByteRange],
    archive_size: u64,
) -> Result<()> {
    if ranges.is_empty() {
        bail!("no parts uploaded");
    }

    let mut expected_start = 0u64;
    for (i, range) in ranges.iter().enumerate() {
        if range.start != expected_start {
            bail!(
                "missing or overlapping part at offset {expected_start} (next part starts at {})",
                range.start
            );
        }
        let is_last = i + 1 == ranges.len();
        if !is_last && range.len() != part_size.bytes() {
            bail!(
                "part {} is {} bytes; only the final part may be shorter than {}",
                range.content_range(),
                range.len(),
                part_size
            );
        }
        expected_start = range.end;
    }

    if expected_start != archive_size {
        bail!("parts cover {expected_start} bytes but archive size is {archive_size}");
    }
    Ok(())
}

/// Compare the claimed archive checksum to the assembled tree hash.
pub(crate) fn check_archive_hash(claimed: &str, actual: &TreeHash) -> Result<()> {
    let claimed = TreeHash::from_hex(claimed)?;
    if &claimed != actual {
        bail!("archive checksum mismatch: sent {claimed}, parts hash to {actual}");
    }
    Ok(())
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    fn range(start: u64, end: u64) -> ByteRange {
        ByteRange::new(start, end).unwrap()
    }

    #[test]
    fn part_must_be_aligned() {
        let ps = PartSize::new(MIB).unwrap();
        let body = vec![0u8; 10];
        let sum = tree_hash_bytes(&body).to_hex();
        assert!(check_part(ps, range(0, 10), &body, &sum).is_ok());
        let err = check_part(ps, range(5, 15), &body, &sum).unwrap_err();
        assert!(err.to_string().contains("boundary"));
    }

    #[test]
    fn part_checksum_must_match_body() {
        let ps = PartSize::new(MIB).unwrap();
        let body = vec![7u8; 100];
        let wrong = tree_hash_bytes(b"something else").to_hex();
        let err = check_part(ps, range(0, 100), &body, &wrong).unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn part_length_must_match_range() {
        let ps = PartSize::new(MIB).unwrap();
        let body = vec![7u8; 100];
        let sum = tree_hash_bytes(&body).to_hex();
        assert!(check_part(ps, range(0, 99), &body, &sum).is_err());
    }

    #[test]
    fn layout_requires_full_parts_before_last() {
        let ps = PartSize::new(MIB).unwrap();
        assert!(check_layout(ps, &[range(0, MIB), range(MIB, MIB + 5)], MIB + 5).is_ok());
        assert!(check_layout(ps, &[range(0, 5), range(MIB, MIB + 5)], MIB + 5).is_err());
        assert!(check_layout(ps, &[range(0, MIB)], 2 * MIB).is_err());
        assert!(check_layout(ps, &[], 0).is_err());
    }
}
