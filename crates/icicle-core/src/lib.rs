pub mod config;
pub mod error;
pub mod types;

pub use error::{IcicleError, IcicleResult};
pub use types::{ByteRange, PartSize, RemoteOp};
