//! icicle: archival vault uploader
//!
//! Commands:
//!   upload <file>        - multipart upload with tree-hash verification
//!   tree-hash <file>...  - print the tree hash of local files
//!   list-uploads         - show open multipart sessions in a vault
//!   abort-all            - abort every open session in a vault
//!   config show          - display current configuration

mod journal;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use icicle_core::config::IcicleConfig;
use icicle_core::PartSize;
use icicle_upload::{
    abort_all_uploads, upload_archive, TracingObserver, UploadObserver, UploadRequest,
};
use icicle_vault::{S3Credentials, VaultBackend, VaultOps};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::journal::JournalObserver;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "icicle",
    version,
    about = "Upload files to an archival vault",
    long_about = "icicle: multipart uploads to an archival vault, verified with SHA-256 tree hashes"
)]
struct Cli {
    /// Path to icicle.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "ICICLE_CONFIG",
        default_value = "~/.config/icicle/config.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides log.level
    #[arg(long, env = "ICICLE_LOG")]
    log: Option<String>,

    /// Log format; overrides log.format
    #[arg(long, env = "ICICLE_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upload a file as a single archive
    ///
    /// Glacier and S3 credentials are read from AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY.
    Upload {
        /// Local file
        file: PathBuf,
        /// Target vault (default: upload.vault)
        #[arg(long)]
        vault: Option<String>,
        /// Archive description (default: upload.description)
        #[arg(long, short = 'd')]
        description: Option<String>,
        /// Part size in bytes, a power of two from 1 MiB to 4 GiB (default: upload.part_size)
        #[arg(long)]
        part_size: Option<u64>,
    },

    /// Print the SHA-256 tree hash of each file
    #[command(name = "tree-hash")]
    TreeHash {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// List open multipart uploads
    #[command(name = "list-uploads")]
    ListUploads {
        #[arg(long)]
        vault: Option<String>,
    },

    /// Abort every open multipart upload in a vault
    #[command(name = "abort-all")]
    AbortAll {
        #[arg(long)]
        vault: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let (config, from_file) = load_config(&config_path).await?;

    let level = cli.log.as_deref().unwrap_or(&config.log.level);
    let format = match cli.log_format {
        Some(f) => f,
        None => LogFormat::from_str(&config.log.format, true).unwrap_or(LogFormat::Text),
    };
    init_logging(level, &format);
    if !from_file {
        warn!(
            "config file not found: {}  (using defaults)",
            config_path.display()
        );
    }

    match cli.command {
        Commands::Upload {
            file,
            vault,
            description,
            part_size,
        } => cmd_upload(&config, &file, vault, description, part_size).await,
        Commands::TreeHash { files } => cmd_tree_hash(&files),
        Commands::ListUploads { vault } => cmd_list_uploads(&config, vault).await,
        Commands::AbortAll { vault } => cmd_abort_all(&config, vault).await,
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &config_path, from_file),
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

/// Returns the configuration and whether it came from a file.
async fn load_config(path: &Path) -> Result<(IcicleConfig, bool)> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config: {}", path.display()))?;
        let config = IcicleConfig::from_toml(&content)
            .with_context(|| format!("parsing config: {}", path.display()))?;
        Ok((config, true))
    } else {
        Ok((IcicleConfig::default(), false))
    }
}

/// Expand `~` in path to the user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_default();
        PathBuf::from(home).join(rest)
    } else {
        path.to_path_buf()
    }
}

// ── Vault from config and environment credentials ─────────────────────────────

/// Reads AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY (standard AWS env vars).
fn credentials_from_env() -> Result<S3Credentials> {
    let access_key_id = std::env::var("AWS_ACCESS_KEY_ID").context(
        "AWS credentials not set\n\
         Set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY environment variables.\n\
         Example:\n\
         \texport AWS_ACCESS_KEY_ID=your-key\n\
         \texport AWS_SECRET_ACCESS_KEY=your-secret",
    )?;
    let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
        .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
    Ok(S3Credentials {
        access_key_id,
        secret_access_key,
    })
}

fn open_vault(config: &IcicleConfig) -> Result<VaultBackend> {
    let mut storage = config.storage.clone();
    storage.root = expand_tilde(&storage.root);

    let creds = match storage.backend.as_str() {
        "s3" | "glacier" => Some(credentials_from_env()?),
        _ => None,
    };
    let vault = VaultBackend::open(&storage, creds.as_ref())?;
    info!(backend = %storage.backend, kind = vault.name(), "vault storage ready");
    Ok(vault)
}

// ── `icicle upload` ───────────────────────────────────────────────────────────

async fn cmd_upload(
    config: &IcicleConfig,
    file: &Path,
    vault: Option<String>,
    description: Option<String>,
    part_size: Option<u64>,
) -> Result<()> {
    let part_size = match part_size {
        Some(bytes) => PartSize::new(bytes)?,
        None => config.upload.part_size,
    };
    let request = UploadRequest {
        path: file.to_path_buf(),
        vault: vault.unwrap_or_else(|| config.upload.vault.clone()),
        description: description.unwrap_or_else(|| config.upload.description.clone()),
        part_size,
    };

    let ops = open_vault(config)?;
    let observer: Box<dyn UploadObserver> = if config.journal.enabled {
        Box::new(JournalObserver::open(&expand_tilde(&config.journal.dir))?)
    } else {
        Box::new(TracingObserver)
    };

    println!(
        "Uploading {} → vault {} (part size {})",
        file.display(),
        request.vault,
        part_size
    );
    let receipt = upload_archive(&ops, request, observer.as_ref())
        .await
        .with_context(|| format!("uploading {}", file.display()))?;

    println!("  archive:   {}", receipt.archive_id);
    println!("  tree hash: {}", receipt.checksum);
    println!("  size:      {} bytes", receipt.size);
    println!("  location:  {}", receipt.location);
    Ok(())
}

// ── `icicle tree-hash` ────────────────────────────────────────────────────────

fn cmd_tree_hash(files: &[PathBuf]) -> Result<()> {
    for file in files {
        let hash = icicle_treehash::tree_hash_file(file)
            .with_context(|| format!("hashing {}", file.display()))?;
        println!("{hash}  {}", file.display());
    }
    Ok(())
}

// ── `icicle list-uploads` / `icicle abort-all` ────────────────────────────────

async fn cmd_list_uploads(config: &IcicleConfig, vault: Option<String>) -> Result<()> {
    let vault = vault.unwrap_or_else(|| config.upload.vault.clone());
    let ops = open_vault(config)?;
    let uploads = ops
        .list_uploads(&vault)
        .await
        .with_context(|| format!("listing uploads in vault {vault}"))?;

    if uploads.is_empty() {
        println!("No open uploads in vault {vault}");
        return Ok(());
    }
    for u in &uploads {
        println!(
            "{}  created={}  part_size={}  {}",
            u.upload_id, u.created, u.part_size, u.description
        );
    }
    Ok(())
}

async fn cmd_abort_all(config: &IcicleConfig, vault: Option<String>) -> Result<()> {
    let vault = vault.unwrap_or_else(|| config.upload.vault.clone());
    let ops = open_vault(config)?;
    let summary = abort_all_uploads(&ops, &vault, &TracingObserver).await?;

    for id in &summary.aborted {
        println!("aborted  {id}");
    }
    for (id, err) in &summary.failed {
        println!("FAILED   {id}: {err}");
    }
    println!(
        "{} aborted, {} failed in vault {vault}",
        summary.aborted.len(),
        summary.failed.len()
    );
    if !summary.is_clean() {
        anyhow::bail!("{} upload(s) could not be aborted", summary.failed.len());
    }
    Ok(())
}

// ── `icicle config show` ──────────────────────────────────────────────────────

fn cmd_config_show(config: &IcicleConfig, config_path: &Path, from_file: bool) -> Result<()> {
    if from_file {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!(
            "# Configuration: defaults (no file at {})",
            config_path.display()
        );
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
