//! Vault selected by `storage.backend`

use anyhow::{Context, Result};
use icicle_core::config::StorageConfig;
use icicle_core::{ByteRange, PartSize};

use crate::glacier::GlacierVault;
use crate::object::ObjectVault;
use crate::operator::{build_operator, S3Credentials};
use crate::ops::{ArchiveReceipt, PartReceipt, UploadSummary, VaultOps};

/// "glacier" talks to the vault service; every other backend stores the
/// vault layout through OpenDAL.
pub enum VaultBackend {
    Glacier(GlacierVault),
    Object(ObjectVault),
}

impl VaultBackend {
    /// `creds` is required by "glacier" and "s3".
    pub fn open(storage: &StorageConfig, creds: Option<&S3Credentials>) -> Result<Self> {
        match storage.backend.as_str() {
            "glacier" => {
                let creds = creds.context("the glacier backend needs credentials")?;
                Ok(Self::Glacier(GlacierVault::connect(storage, creds)?))
            }
            _ => {
                let op = build_operator(storage, creds).context("building storage operator")?;
                Ok(Self::Object(ObjectVault::new(op)))
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Glacier(_) => "glacier",
            Self::Object(_) => "object",
        }
    }
}

impl VaultOps for VaultBackend {
    async fn initiate_upload(
        &self,
        vault: &str,
        description: &str,
        part_size: PartSize,
    ) -> Result<String> {
        match self {
            Self::Glacier(v) => v.initiate_upload(vault, description, part_size).await,
            Self::Object(v) => v.initiate_upload(vault, description, part_size).await,
        }
    }

    async fn upload_part(
        &self,
        vault: &str,
        upload_id: &str,
        checksum: &str,
        range: ByteRange,
        body: &[u8],
    ) -> Result<PartReceipt> {
        match self {
            Self::Glacier(v) => v.upload_part(vault, upload_id, checksum, range, body).await,
            Self::Object(v) => v.upload_part(vault, upload_id, checksum, range, body).await,
        }
    }

    async fn complete_upload(
        &self,
        vault: &str,
        upload_id: &str,
        checksum: &str,
        archive_size: u64,
    ) -> Result<ArchiveReceipt> {
        match self {
            Self::Glacier(v) => {
                v.complete_upload(vault, upload_id, checksum, archive_size)
                    .await
            }
            Self::Object(v) => {
                v.complete_upload(vault, upload_id, checksum, archive_size)
                    .await
            }
        }
    }

    async fn abort_upload(&self, vault: &str, upload_id: &str) -> Result<()> {
        match self {
            Self::Glacier(v) => v.abort_upload(vault, upload_id).await,
            Self::Object(v) => v.abort_upload(vault, upload_id).await,
        }
    }

    async fn list_uploads(&self, vault: &str) -> Result<Vec<UploadSummary>> {
        match self {
            Self::Glacier(v) => v.list_uploads(vault).await,
            Self::Object(v) => v.list_uploads(vault).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use icicle_treehash::tree_hash_bytes;

    fn creds() -> S3Credentials {
        S3Credentials {
            access_key_id: "key".into(),
            secret_access_key: "secret".into(),
        }
    }

    fn storage(backend: &str) -> StorageConfig {
        StorageConfig {
            backend: backend.into(),
            ..Default::default()
        }
    }

    #[test]
    fn glacier_backend_selects_the_service_client() {
        let backend = VaultBackend::open(&storage("glacier"), Some(&creds())).unwrap();
        assert_eq!(backend.name(), "glacier");
    }

    #[test]
    fn glacier_backend_needs_credentials() {
        let err = VaultBackend::open(&storage("glacier"), None).err().unwrap();
        assert!(err.to_string().contains("credentials"));
    }

    #[test]
    fn s3_backend_stays_on_opendal() {
        let backend = VaultBackend::open(&storage("s3"), Some(&creds())).unwrap();
        assert_eq!(backend.name(), "object");
    }

    #[tokio::test]
    async fn memory_backend_delegates_every_call() {
        let backend = VaultBackend::open(&storage("memory"), None).unwrap();
        assert_eq!(backend.name(), "object");

        let body = b"frozen";
        let checksum = tree_hash_bytes(body).to_hex();
        let id = backend
            .initiate_upload("v", "d", PartSize::DEFAULT)
            .await
            .unwrap();
        assert_eq!(backend.list_uploads("v").await.unwrap().len(), 1);

        backend
            .upload_part("v", &id, &checksum, ByteRange::new(0, 6).unwrap(), body)
            .await
            .unwrap();
        let receipt = backend.complete_upload("v", &id, &checksum, 6).await.unwrap();
        assert_eq!(receipt.checksum, checksum);
        assert!(backend.list_uploads("v").await.unwrap().is_empty());

        let other = backend
            .initiate_upload("v", "d", PartSize::DEFAULT)
            .await
            .unwrap();
        backend.abort_upload("v", &other).await.unwrap();
        assert!(backend.list_uploads("v").await.unwrap().is_empty());
    }
}
