//! OpenDAL Operator factory for icicle vault backends

use anyhow::{bail, Context, Result};
use icicle_core::config::StorageConfig;
use opendal::Operator;

/// S3 credentials, loaded by the caller
#[derive(Debug, Clone)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Build an OpenDAL Operator for the configured backend.
///
/// `s3` needs credentials; `fs` roots the vaults at `storage.root`; `memory`
/// keeps everything in-process. No RetryLayer: a failed call surfaces as-is.
pub fn build_operator(storage: &StorageConfig, creds: Option<&S3Credentials>) -> Result<Operator> {
    let op = match storage.backend.as_str() {
        "s3" => {
            let creds = creds.context("the s3 backend needs credentials")?;
            build_s3(storage, creds)?
        }
        "fs" => {
            let builder = opendal::services::Fs::default().root(&storage.root.to_string_lossy());
            Operator::new(builder)
                .context("creating OpenDAL fs operator")?
                .finish()
        }
        "memory" => Operator::new(opendal::services::Memory::default())
            .context("creating OpenDAL memory operator")?
            .finish(),
        other => bail!("unknown storage backend '{other}'"),
    };

    Ok(op.layer(opendal::layers::LoggingLayer::default()))
}

/// S3 (or any S3-compatible endpoint) with path-style addressing.
///
/// If `enforce_tls` is true and the endpoint uses HTTP, this returns an error.
/// Otherwise, a warning is logged for non-HTTPS endpoints.
fn build_s3(storage: &StorageConfig, creds: &S3Credentials) -> Result<Operator> {
    if storage.endpoint.starts_with("http://") {
        if storage.enforce_tls {
            bail!(
                "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                 Use an HTTPS endpoint or set storage.enforce_tls = false for local development.",
                storage.endpoint
            );
        }
        tracing::warn!(
            endpoint = %storage.endpoint,
            "S3 endpoint uses plaintext HTTP — credentials are transmitted unencrypted. \
             Set storage.enforce_tls = true and use HTTPS in production."
        );
    }

    // opendal 0.55: S3 builder uses consuming pattern (methods take `self`, return `Self`)
    let builder = opendal::services::S3::default()
        .endpoint(&storage.endpoint)
        .region(&storage.region)
        .bucket(&storage.bucket)
        .access_key_id(&creds.access_key_id)
        .secret_access_key(&creds.secret_access_key);

    Ok(Operator::new(builder)
        .context("creating OpenDAL S3 operator")?
        .finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> S3Credentials {
        S3Credentials {
            access_key_id: "key".into(),
            secret_access_key: "secret".into(),
        }
    }

    #[test]
    fn test_memory_backend() {
        let storage = StorageConfig {
            backend: "memory".into(),
            ..Default::default()
        };
        assert!(build_operator(&storage, None).is_ok());
    }

    #[test]
    fn test_fs_backend() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = StorageConfig {
            backend: "fs".into(),
            root: tmp.path().to_path_buf(),
            ..Default::default()
        };
        assert!(build_operator(&storage, None).is_ok());
    }

    #[test]
    fn test_s3_requires_credentials() {
        let storage = StorageConfig::default();
        let err = build_operator(&storage, None).unwrap_err();
        assert!(err.to_string().contains("credentials"));
    }

    #[test]
    fn test_s3_http_warning() {
        // HTTP endpoint with enforce_tls=false should succeed (but log warning)
        let storage = StorageConfig {
            endpoint: "http://localhost:8333".into(),
            enforce_tls: false,
            ..Default::default()
        };
        assert!(build_operator(&storage, Some(&creds())).is_ok());
    }

    #[test]
    fn test_s3_http_enforce_tls() {
        let storage = StorageConfig {
            endpoint: "http://insecure:8333".into(),
            enforce_tls: true,
            ..Default::default()
        };
        let result = build_operator(&storage, Some(&creds()));
        assert!(result.is_err(), "HTTP + enforce_tls must fail");
        assert!(result.unwrap_err().to_string().contains("enforce_tls"));
    }

    #[test]
    fn test_s3_https() {
        let storage = StorageConfig {
            endpoint: "https://s3.example.com:8333".into(),
            enforce_tls: true,
            ..Default::default()
        };
        assert!(build_operator(&storage, Some(&creds())).is_ok());
    }

    #[test]
    fn test_unknown_backend() {
        let storage = StorageConfig {
            backend: "tape".into(),
            ..Default::default()
        };
        assert!(build_operator(&storage, None).is_err());
    }
}
