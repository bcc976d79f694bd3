//! Sequential part upload
//!
//! The file is read once, front to back, in `part_size` chunks. Each chunk is
//! tree hashed and sent before the next one is read; nothing is retried.

use icicle_core::{ByteRange, IcicleError, IcicleResult, RemoteOp};
use icicle_treehash::{tree_hash, HashSource};
use icicle_vault::VaultOps;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

use crate::observer::{UploadEvent, UploadObserver};
use crate::session::UploadSession;

/// Upload every part of `path` into `session`, returning the part count.
///
/// Records are pushed as each part is acknowledged, so on failure `session`
/// still holds the parts that made it.
pub async fn upload_parts<V: VaultOps>(
    ops: &V,
    path: &Path,
    session: &mut UploadSession,
    observer: &dyn UploadObserver,
) -> IcicleResult<usize> {
    let mut file = std::fs::File::open(path)?;
    let part_size = session.part_size.bytes();
    let mut buf = Vec::with_capacity(part_size.min(session.total_size) as usize);

    loop {
        buf.clear();
        let n = (&mut file).take(part_size).read_to_end(&mut buf)?;
        if n == 0 {
            break;
        }

        let start = session.next_offset();
        let range = ByteRange::new(start, start + n as u64)?;
        let hash = tree_hash(HashSource::Buffer(&buf))?;
        let checksum = hash.to_hex();
        let index = session.parts().len();

        debug!(upload_id = %session.upload_id, part = index, range = %range, "uploading part");
        let receipt = ops
            .upload_part(&session.vault, &session.upload_id, &checksum, range, &buf)
            .await
            .map_err(|e| {
                IcicleError::upload_failed(
                    RemoteOp::UploadPart,
                    e.context(format!("part {index} ({})", range.content_range())),
                )
            })?;

        if let Ok(body) = serde_json::to_string(&receipt) {
            observer.on_event(&UploadEvent::RemoteResponse {
                op: RemoteOp::UploadPart,
                upload_id: &session.upload_id,
                body: &body,
            });
        }
        if receipt.checksum != checksum {
            warn!(
                upload_id = %session.upload_id,
                part = index,
                local = %checksum,
                remote = %receipt.checksum,
                "vault reported a different part checksum; keeping the local hash"
            );
        }

        let record = session.push_part(range, hash);
        observer.on_event(&UploadEvent::PartUploaded {
            session: &*session,
            part: &record,
            remote_checksum: &receipt.checksum,
        });
    }

    Ok(session.parts().len())
}
