//! icicle-upload: multipart archive upload with tree-hash verification
//!
//!   - `parts`: read a file in part-size chunks, hash and upload each one
//!   - `orchestrator`: initiate → parts → verify → complete, abort on failure
//!   - `cleanup`: abort every open session in a vault
//!   - `observer`: structured events for logs, journals, or telemetry

pub mod cleanup;
pub mod observer;
pub mod orchestrator;
pub mod parts;
pub mod session;

pub use cleanup::{abort_all_uploads, AbortSummary};
pub use observer::{NoopObserver, TracingObserver, UploadEvent, UploadObserver};
pub use orchestrator::{upload_archive, ArchiveUpload, UploadRequest, UploadState};
pub use parts::upload_parts;
pub use session::{PartRecord, UploadSession};
