use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{IcicleError, IcicleResult};
use crate::types::PartSize;

/// Top-level configuration (loaded from icicle.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IcicleConfig {
    pub log: LogConfig,
    pub upload: UploadConfig,
    pub storage: StorageConfig,
    pub journal: JournalConfig,
}

impl IcicleConfig {
    /// Parse a TOML document; missing sections fall back to defaults.
    pub fn from_toml(content: &str) -> IcicleResult<Self> {
        let config: IcicleConfig =
            toml::from_str(content).map_err(|e| IcicleError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that serde defaults can't express on their own.
    pub fn validate(&self) -> IcicleResult<()> {
        if self.upload.vault.trim().is_empty() {
            return Err(IcicleError::Config("upload.vault must not be empty".into()));
        }
        match self.storage.backend.as_str() {
            "s3" | "fs" | "memory" | "glacier" => {}
            other => {
                return Err(IcicleError::Config(format!(
                    "unknown storage.backend '{other}' (expected s3, fs, memory or glacier)"
                )))
            }
        }
        if self.storage.backend == "glacier" && self.storage.glacier.account_id.is_empty() {
            return Err(IcicleError::Config(
                "storage.glacier.account_id must not be empty (use \"-\" for the caller's account)"
                    .into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Target vault name
    pub vault: String,
    /// Free-text archive description sent at initiation
    pub description: String,
    /// Multipart part size in bytes (power of two, 1 MiB..4 GiB)
    pub part_size: PartSize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend: "glacier", "s3", "fs" or "memory"
    pub backend: String,
    /// S3-compatible endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// Bucket holding all vaults
    pub bucket: String,
    /// Root directory for the fs backend
    pub root: PathBuf,
    /// Enforce HTTPS for S3 connections (warn/error on HTTP endpoints)
    pub enforce_tls: bool,
    /// Settings for the "glacier" backend
    pub glacier: GlacierConfig,
}

/// Amazon Glacier vault service; `region` and `enforce_tls` come from `[storage]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlacierConfig {
    /// Account owning the vaults; "-" means the account of the credentials
    pub account_id: String,
    /// Endpoint override; empty resolves the regional AWS endpoint
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Append parts/responses/archives logs under `dir`
    pub enabled: bool,
    /// Directory holding parts.log, responses.log and archives.log
    pub dir: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            vault: "default".into(),
            description: String::new(),
            part_size: PartSize::DEFAULT,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "s3".into(),
            endpoint: "http://localhost:8333".into(),
            region: "us-east-1".into(),
            bucket: "icicle".into(),
            root: PathBuf::from("~/.local/share/icicle/vaults"),
            enforce_tls: false,
            glacier: GlacierConfig::default(),
        }
    }
}

impl Default for GlacierConfig {
    fn default() -> Self {
        Self {
            account_id: "-".into(),
            endpoint: String::new(),
        }
    }
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from("~/.local/share/icicle"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[log]
level = "debug"
format = "json"

[upload]
vault = "icicles"
description = "nightly backup"
part_size = 67108864

[storage]
backend = "fs"
root = "/srv/vaults"
enforce_tls = true

[journal]
enabled = false
dir = "/var/log/icicle"
"#;
        let config = IcicleConfig::from_toml(toml_str).unwrap();

        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.format, "json");
        assert_eq!(config.upload.vault, "icicles");
        assert_eq!(config.upload.description, "nightly backup");
        assert_eq!(config.upload.part_size.bytes(), 64 * 1024 * 1024);
        assert_eq!(config.storage.backend, "fs");
        assert_eq!(config.storage.root, PathBuf::from("/srv/vaults"));
        assert!(config.storage.enforce_tls);
        assert!(!config.journal.enabled);
        assert_eq!(config.journal.dir, PathBuf::from("/var/log/icicle"));
    }

    #[test]
    fn test_parse_defaults() {
        let config = IcicleConfig::from_toml("").unwrap();

        assert_eq!(config.log.level, "info");
        assert_eq!(config.upload.vault, "default");
        assert_eq!(config.upload.part_size, PartSize::DEFAULT);
        assert_eq!(config.storage.backend, "s3");
        assert_eq!(config.storage.endpoint, "http://localhost:8333");
        assert!(!config.storage.enforce_tls);
        assert!(config.journal.enabled);
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[upload]
vault = "photos"
"#;
        let config = IcicleConfig::from_toml(toml_str).unwrap();

        // Overridden
        assert_eq!(config.upload.vault, "photos");
        // Defaults
        assert_eq!(config.upload.part_size, PartSize::DEFAULT);
        assert_eq!(config.storage.region, "us-east-1");
        assert_eq!(config.log.format, "text");
    }

    #[test]
    fn test_rejects_bad_part_size() {
        let toml_str = r#"
[upload]
part_size = 3000000
"#;
        let err = IcicleConfig::from_toml(toml_str).unwrap_err();
        assert!(matches!(err, IcicleError::Config(_)));
        assert!(err.to_string().contains("power of two"), "got: {err}");
    }

    #[test]
    fn test_rejects_unknown_backend() {
        let toml_str = r#"
[storage]
backend = "tape"
"#;
        let err = IcicleConfig::from_toml(toml_str).unwrap_err();
        assert!(err.to_string().contains("tape"));
    }

    #[test]
    fn test_parse_glacier_backend() {
        let toml_str = r#"
[storage]
backend = "glacier"
region = "eu-west-1"

[storage.glacier]
account_id = "123456789012"
"#;
        let config = IcicleConfig::from_toml(toml_str).unwrap();

        assert_eq!(config.storage.backend, "glacier");
        assert_eq!(config.storage.region, "eu-west-1");
        assert_eq!(config.storage.glacier.account_id, "123456789012");
        assert!(config.storage.glacier.endpoint.is_empty());
    }

    #[test]
    fn test_glacier_defaults_to_own_account() {
        let config = IcicleConfig::from_toml("[storage]\nbackend = \"glacier\"\n").unwrap();
        assert_eq!(config.storage.glacier.account_id, "-");
    }

    #[test]
    fn test_glacier_rejects_empty_account() {
        let toml_str = r#"
[storage]
backend = "glacier"

[storage.glacier]
account_id = ""
"#;
        let err = IcicleConfig::from_toml(toml_str).unwrap_err();
        assert!(err.to_string().contains("account_id"), "got: {err}");
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = IcicleConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed = IcicleConfig::from_toml(&toml_str).unwrap();

        assert_eq!(config.upload.vault, parsed.upload.vault);
        assert_eq!(config.upload.part_size, parsed.upload.part_size);
        assert_eq!(config.storage.endpoint, parsed.storage.endpoint);
        assert_eq!(config.storage.glacier.account_id, parsed.storage.glacier.account_id);
    }
}
