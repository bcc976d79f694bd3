use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{IcicleError, IcicleResult};

/// Size of one tree-hash leaf (1 MiB)
pub const MIB: u64 = 1024 * 1024;

/// Smallest part size a vault accepts (1 MiB)
pub const MIN_PART_SIZE: u64 = MIB;

/// Largest part size a vault accepts (4 GiB)
pub const MAX_PART_SIZE: u64 = 4 * 1024 * MIB;

/// The remote operations the upload core invokes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemoteOp {
    Initiate,
    UploadPart,
    Complete,
    Abort,
    List,
}

impl fmt::Display for RemoteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RemoteOp::Initiate => "initiate",
            RemoteOp::UploadPart => "upload-part",
            RemoteOp::Complete => "complete",
            RemoteOp::Abort => "abort",
            RemoteOp::List => "list",
        };
        f.write_str(s)
    }
}

/// Half-open byte range `[start, end)` within a file.
///
/// On the wire it is written with an inclusive end: `bytes {start}-{end-1}/*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> IcicleResult<Self> {
        if end <= start {
            return Err(IcicleError::InvalidRange(format!(
                "empty or inverted range [{start}, {end})"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    /// Wire form: `bytes 0-1048575/*`
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/*", self.start, self.end - 1)
    }

    /// Parse the wire form back into a half-open range.
    pub fn parse_content_range(s: &str) -> IcicleResult<Self> {
        let bad = || IcicleError::InvalidRange(format!("malformed content range '{s}'"));

        let rest = s.strip_prefix("bytes ").ok_or_else(bad)?;
        let (span, total) = rest.split_once('/').ok_or_else(bad)?;
        if total != "*" {
            return Err(bad());
        }
        let (first, last) = span.split_once('-').ok_or_else(bad)?;
        let first: u64 = first.parse().map_err(|_| bad())?;
        let last: u64 = last.parse().map_err(|_| bad())?;
        // `u64::MAX` as the inclusive end has no half-open form
        let end = last.checked_add(1).ok_or_else(bad)?;
        Self::new(first, end).map_err(|_| bad())
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Validated multipart part size: a power of two in `[1 MiB, 4 GiB]`.
///
/// Power-of-two multiples of the 1 MiB leaf keep part boundaries on tree
/// boundaries, so per-part tree hashes fold into the whole-file tree hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct PartSize(u64);

impl PartSize {
    /// 16 MiB
    pub const DEFAULT: PartSize = PartSize(16 * MIB);

    pub fn new(bytes: u64) -> IcicleResult<Self> {
        if !bytes.is_power_of_two() || !(MIN_PART_SIZE..=MAX_PART_SIZE).contains(&bytes) {
            return Err(IcicleError::InvalidPartSize(bytes));
        }
        Ok(Self(bytes))
    }

    pub fn bytes(self) -> u64 {
        self.0
    }

    /// Number of parts a file of `total` bytes splits into.
    pub fn part_count(self, total: u64) -> u64 {
        total.div_ceil(self.0)
    }
}

impl Default for PartSize {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u64> for PartSize {
    type Error = IcicleError;

    fn try_from(bytes: u64) -> IcicleResult<Self> {
        PartSize::new(bytes)
    }
}

impl From<PartSize> for u64 {
    fn from(p: PartSize) -> u64 {
        p.0
    }
}

impl fmt::Display for PartSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
