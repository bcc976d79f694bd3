//! Leaf chunking and whole-source tree hashing
//!
//! A source is cut into 1 MiB leaves (the last one may be shorter), each leaf
//! is hashed with SHA-256, and the leaves are folded by [`crate::combine`].

use icicle_core::{IcicleError, IcicleResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::Read;
use std::path::Path;

/// Leaf size for tree hashing (1 MiB)
pub const LEAF_SIZE: usize = 1024 * 1024;

/// SHA-256 of the empty byte string: the tree hash of an empty source.
pub const EMPTY_TREE_HASH: TreeHash = TreeHash([
    0xe3, 0xb0, 0xc4, 0x42, 0x98, 0xfc, 0x1c, 0x14, 0x9a, 0xfb, 0xf4, 0xc8, 0x99, 0x6f, 0xb9,
    0x24, 0x27, 0xae, 0x41, 0xe4, 0x64, 0x9b, 0x93, 0x4c, 0xa4, 0x95, 0x99, 0x1b, 0x78, 0x52,
    0xb8, 0x55,
]);

/// A tree-hash node: 32 raw SHA-256 bytes, displayed as 64 lowercase hex chars.
///
/// Leaves and interior nodes share this type. Vault protocols want the hex
/// form, combining wants the raw bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct TreeHash([u8; 32]);

impl TreeHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// SHA-256 of a single leaf's bytes.
    pub fn of_leaf(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-char hex string
    pub fn from_hex(s: &str) -> IcicleResult<Self> {
        let mut out = [0u8; 32];
        hex::decode_to_slice(s, &mut out)
            .map_err(|e| anyhow::anyhow!("invalid tree hash hex '{s}': {e}"))?;
        Ok(Self(out))
    }
}

impl fmt::Display for TreeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for TreeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TreeHash({})", self.to_hex())
    }
}

impl From<TreeHash> for String {
    fn from(h: TreeHash) -> String {
        h.to_hex()
    }
}

impl TryFrom<String> for TreeHash {
    type Error = IcicleError;

    fn try_from(s: String) -> IcicleResult<Self> {
        TreeHash::from_hex(&s)
    }
}

/// Input to [`tree_hash`], chosen explicitly by the caller.
pub enum HashSource<'a> {
    /// Any readable stream; read to EOF
    Reader(&'a mut dyn Read),
    /// Bytes already in memory
    Buffer(&'a [u8]),
    /// A regular file; opened for the duration of the hash only
    Path(&'a Path),
}

/// Tree hash of any supported source.
pub fn tree_hash(source: HashSource<'_>) -> IcicleResult<TreeHash> {
    match source {
        HashSource::Reader(reader) => tree_hash_reader(reader),
        HashSource::Buffer(data) => Ok(tree_hash_bytes(data)),
        HashSource::Path(path) => tree_hash_file(path),
    }
}

/// Tree hash of an in-memory buffer. Infallible.
pub fn tree_hash_bytes(data: &[u8]) -> TreeHash {
    let leaves: Vec<TreeHash> = data.chunks(LEAF_SIZE).map(TreeHash::of_leaf).collect();
    crate::combine::fold(leaves).unwrap_or(EMPTY_TREE_HASH)
}

/// Tree hash of a stream, read leaf by leaf until EOF.
pub fn tree_hash_reader<R: Read + ?Sized>(reader: &mut R) -> IcicleResult<TreeHash> {
    let leaves = leaf_hashes(reader).collect::<std::io::Result<Vec<_>>>()?;
    Ok(crate::combine::fold(leaves).unwrap_or(EMPTY_TREE_HASH))
}

/// Tree hash of a regular file on disk.
pub fn tree_hash_file(path: &Path) -> IcicleResult<TreeHash> {
    let meta = std::fs::metadata(path)?;
    if !meta.is_file() {
        return Err(IcicleError::InvalidSourceKind(format!(
            "{} is not a regular file",
            path.display()
        )));
    }

    let mut file = std::fs::File::open(path)?;
    let hash = tree_hash_reader(&mut file)?;
    tracing::debug!(path = %path.display(), size = meta.len(), hash = %hash, "tree hashed file");
    Ok(hash)
}

/// Lazily hash a stream in 1 MiB leaves.
pub fn leaf_hashes<R: Read + ?Sized>(reader: &mut R) -> LeafHashes<'_, R> {
    LeafHashes {
        reader,
        buf: Vec::with_capacity(LEAF_SIZE),
        done: false,
    }
}

/// Iterator returned by [`leaf_hashes`].
///
/// Short reads are coalesced, so every leaf but the last is exactly
/// [`LEAF_SIZE`] bytes. An empty stream yields no leaves.
pub struct LeafHashes<'r, R: Read + ?Sized> {
    reader: &'r mut R,
    buf: Vec<u8>,
    done: bool,
}

impl<R: Read + ?Sized> Iterator for LeafHashes<'_, R> {
    type Item = std::io::Result<TreeHash>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        self.buf.clear();
        let read = (&mut *self.reader)
            .take(LEAF_SIZE as u64)
            .read_to_end(&mut self.buf);
        match read {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(_) => Some(Ok(TreeHash::of_leaf(&self.buf))),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
