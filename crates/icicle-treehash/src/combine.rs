//! Pairwise folding of tree-hash nodes into a single root

use icicle_core::{IcicleError, IcicleResult};
use sha2::{Digest, Sha256};

use crate::tree::TreeHash;

/// SHA-256 over `left ++ right` raw digests. Order matters.
pub fn hash_pair(left: &TreeHash, right: &TreeHash) -> TreeHash {
    let mut hasher = Sha256::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    TreeHash::from_bytes(hasher.finalize().into())
}

/// Fold an ordered list of nodes into the tree root.
///
/// Each level pairs nodes left to right; an odd trailing node moves up
/// unchanged. A single node is returned as-is.
pub fn combine(hashes: &[TreeHash]) -> IcicleResult<TreeHash> {
    fold(hashes.to_vec()).ok_or(IcicleError::EmptyInput)
}

pub(crate) fn fold(mut level: Vec<TreeHash>) -> Option<TreeHash> {
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => hash_pair(left, right),
                [odd] => *odd,
                _ => unreachable!("chunks(2) yields one or two nodes"),
            })
            .collect();
    }
    level.pop()
}
