//! icicle-vault: the multipart-upload capability and its backends
//!
//! - `ops`: the `VaultOps` trait the upload core is written against
//! - `memory`: an in-process vault with full server-side validation
//! - `object`: a vault persisted through an OpenDAL operator
//! - `operator`: OpenDAL operator factory (s3, fs, memory)
//! - `glacier`: the Amazon Glacier multipart-upload API
//! - `backend`: the vault chosen by `storage.backend`

pub mod backend;
pub mod glacier;
pub mod memory;
pub mod object;
pub mod operator;
pub mod ops;
mod protocol;

pub use backend::VaultBackend;
pub use glacier::GlacierVault;
pub use memory::MemoryVault;
pub use object::ObjectVault;
pub use operator::{build_operator, S3Credentials};
pub use ops::{ArchiveReceipt, PartReceipt, UploadSummary, VaultOps};
