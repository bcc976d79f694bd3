//! Vault backed by the Amazon Glacier multipart-upload API
//!
//! Each `VaultOps` call maps onto one service operation (list pages through
//! the response marker). The service validates ranges and tree hashes itself;
//! this backend only checks that the replies carry what the upload core needs.

use anyhow::{anyhow, bail, Context, Result};
use aws_config::BehaviorVersion;
use aws_sdk_glacier::{
    config::{Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
    types::UploadListElement,
    Client,
};
use icicle_core::config::StorageConfig;
use icicle_core::{ByteRange, PartSize};
use tracing::{debug, info};

use crate::operator::S3Credentials;
use crate::ops::{ArchiveReceipt, PartReceipt, UploadSummary, VaultOps};

pub struct GlacierVault {
    client: Client,
    account_id: String,
}

impl GlacierVault {
    pub fn new(client: Client, account_id: impl Into<String>) -> Self {
        Self {
            client,
            account_id: account_id.into(),
        }
    }

    /// Client for `storage.region` and, when set, `storage.glacier.endpoint`
    pub fn connect(storage: &StorageConfig, creds: &S3Credentials) -> Result<Self> {
        let config = client_config(storage, creds)?;
        Ok(Self::new(
            Client::from_conf(config),
            storage.glacier.account_id.clone(),
        ))
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }
}

/// Static-credential SDK config for the glacier backend.
///
/// An `http://` endpoint override fails under `enforce_tls` and warns otherwise.
pub fn client_config(
    storage: &StorageConfig,
    creds: &S3Credentials,
) -> Result<aws_sdk_glacier::Config> {
    let endpoint = storage.glacier.endpoint.as_str();
    if endpoint.starts_with("http://") {
        if storage.enforce_tls {
            bail!(
                "Glacier endpoint uses plaintext HTTP ({endpoint}), but enforce_tls is enabled. \
                 Use an HTTPS endpoint or set storage.enforce_tls = false for local development."
            );
        }
        tracing::warn!(
            endpoint = %endpoint,
            "Glacier endpoint uses plaintext HTTP; request signatures travel unencrypted"
        );
    }

    let credentials = Credentials::new(
        &creds.access_key_id,
        &creds.secret_access_key,
        None,
        None,
        "icicle",
    );
    let mut builder = aws_sdk_glacier::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new(storage.region.clone()))
        .credentials_provider(credentials);
    if !endpoint.is_empty() {
        builder = builder.endpoint_url(endpoint);
    }
    Ok(builder.build())
}

impl VaultOps for GlacierVault {
    async fn initiate_upload(
        &self,
        vault: &str,
        description: &str,
        part_size: PartSize,
    ) -> Result<String> {
        let out = self
            .client
            .initiate_multipart_upload()
            .account_id(&self.account_id)
            .vault_name(vault)
            .archive_description(description)
            .part_size(part_size.bytes().to_string())
            .send()
            .await
            .map_err(|e| anyhow!("initiating upload in {vault}: {}", DisplayErrorContext(&e)))?;

        let upload_id = out
            .upload_id()
            .context("initiate reply carries no upload id")?
            .to_string();
        debug!(
            vault,
            upload_id = %upload_id,
            part_size = part_size.bytes(),
            "glacier: initiated"
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        vault: &str,
        upload_id: &str,
        checksum: &str,
        range: ByteRange,
        body: &[u8],
    ) -> Result<PartReceipt> {
        let out = self
            .client
            .upload_multipart_part()
            .account_id(&self.account_id)
            .vault_name(vault)
            .upload_id(upload_id)
            .checksum(checksum)
            .range(range.content_range())
            .body(ByteStream::from(body.to_vec()))
            .send()
            .await
            .map_err(|e| {
                anyhow!(
                    "uploading part {} of {upload_id}: {}",
                    range.content_range(),
                    DisplayErrorContext(&e)
                )
            })?;

        let checksum = out
            .checksum()
            .context("part reply carries no checksum")?
            .to_string();
        Ok(PartReceipt { checksum })
    }

    async fn complete_upload(
        &self,
        vault: &str,
        upload_id: &str,
        checksum: &str,
        archive_size: u64,
    ) -> Result<ArchiveReceipt> {
        let out = self
            .client
            .complete_multipart_upload()
            .account_id(&self.account_id)
            .vault_name(vault)
            .upload_id(upload_id)
            .archive_size(archive_size.to_string())
            .checksum(checksum)
            .send()
            .await
            .map_err(|e| anyhow!("completing upload {upload_id}: {}", DisplayErrorContext(&e)))?;

        let archive_id = out
            .archive_id()
            .context("complete reply carries no archive id")?
            .to_string();
        let receipt = ArchiveReceipt {
            checksum: out.checksum().unwrap_or(checksum).to_string(),
            location: out.location().unwrap_or_default().to_string(),
            archive_id,
            size: archive_size,
        };
        info!(
            vault,
            upload_id,
            archive_id = %receipt.archive_id,
            size = archive_size,
            "glacier: archive stored"
        );
        Ok(receipt)
    }

    async fn abort_upload(&self, vault: &str, upload_id: &str) -> Result<()> {
        self.client
            .abort_multipart_upload()
            .account_id(&self.account_id)
            .vault_name(vault)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| anyhow!("aborting upload {upload_id}: {}", DisplayErrorContext(&e)))?;
        debug!(vault, upload_id, "glacier: aborted");
        Ok(())
    }

    async fn list_uploads(&self, vault: &str) -> Result<Vec<UploadSummary>> {
        let mut uploads = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let page = self
                .client
                .list_multipart_uploads()
                .account_id(&self.account_id)
                .vault_name(vault)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| anyhow!("listing uploads in {vault}: {}", DisplayErrorContext(&e)))?;

            for element in page.uploads_list() {
                uploads.push(upload_summary(element)?);
            }
            match page.marker() {
                Some(next) if !next.is_empty() => marker = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(uploads)
    }
}

fn upload_summary(element: &UploadListElement) -> Result<UploadSummary> {
    let upload_id = element
        .multipart_upload_id()
        .context("listed upload has no id")?
        .to_string();
    let part_size = u64::try_from(element.part_size_in_bytes())
        .with_context(|| format!("upload {upload_id} lists a negative part size"))?;
    let created = match element.creation_date() {
        Some(date) => {
            let parsed = chrono::DateTime::parse_from_rfc3339(date)
                .with_context(|| format!("upload {upload_id} creation date '{date}'"))?;
            u64::try_from(parsed.timestamp()).unwrap_or(0)
        }
        None => 0,
    };
    Ok(UploadSummary {
        description: element.archive_description().unwrap_or_default().to_string(),
        upload_id,
        part_size,
        created,
    })
}
