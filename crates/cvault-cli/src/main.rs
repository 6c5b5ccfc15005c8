//! cvault: encrypted clinical file storage CLI
//!
//! Commands:
//!   save <files...>      - encrypt and upload documents for a patient/event
//!   list                 - list records by owner, event, or patient
//!   download <id>        - fetch and decrypt one document
//!   delete <ids...>      - remove documents (object first, then record)
//!   health               - check that the bucket is reachable
//!   config show          - display current configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use cvault_core::config::VaultConfig;
use cvault_files::{FileManager, FileService, FileSummary, Requester, UploadFile};
use cvault_meta::{JsonMetadataStore, ReferenceCheck};
use cvault_storage::{BlobStore, S3Credentials};

type Service = FileService<BlobStore, JsonMetadataStore>;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "cvault",
    version,
    about = "Encrypted clinical file storage",
    long_about = "cvault: encrypt clinical documents per file and keep them in S3-compatible storage"
)]
struct Cli {
    /// Path to cvault.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "CVAULT_CONFIG",
        default_value = "/etc/cvault/config.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, env = "CVAULT_LOG")]
    log: Option<String>,

    /// Log format; overrides the config file
    #[arg(long, env = "CVAULT_LOG_FORMAT")]
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
    /// Encrypt and upload one or more files
    ///
    /// S3 credentials are read from AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY
    /// (or CVAULT_ACCESS_KEY_ID / CVAULT_SECRET_ACCESS_KEY).
    Save {
        /// Local files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Owning user id
        #[arg(long, env = "CVAULT_OWNER")]
        owner: String,
        /// Patient the documents belong to
        #[arg(long)]
        patient: i64,
        /// Clinical event (encounter) id
        #[arg(long)]
        event: Option<String>,
        /// MIME type for every file (default: guessed from extension)
        #[arg(long)]
        content_type: Option<String>,
    },

    /// List stored files (default: files owned by --owner)
    List {
        #[arg(long, env = "CVAULT_OWNER")]
        owner: String,
        /// Only files attached to this event
        #[arg(long, conflicts_with = "patient")]
        event: Option<String>,
        /// Only files belonging to this patient
        #[arg(long)]
        patient: Option<i64>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Download and decrypt a file
    Download {
        /// Record id
        id: String,
        #[arg(long, env = "CVAULT_OWNER")]
        owner: String,
        /// Destination path (default: original file name in the current dir)
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
        /// Print the JSON download response instead of writing a file
        #[arg(long, conflicts_with = "out")]
        json: bool,
    },

    /// Delete files by record id
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
        #[arg(long, env = "CVAULT_OWNER")]
        owner: String,
    },

    /// Check that the storage bucket is reachable
    Health,

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
    let (config, found) = load_config(&cli.config).await?;

    let level = cli.log.as_deref().unwrap_or(&config.service.log_level);
    let format = cli
        .log_format
        .clone()
        .unwrap_or(match config.service.log_format.as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        });
    init_logging(level, &format);

    if !found {
        warn!(
            "config file not found: {}  (using defaults)",
            cli.config.display()
        );
    }

    match cli.command {
        Commands::Save {
            files,
            owner,
            patient,
            event,
            content_type,
        } => {
            cmd_save(
                &config,
                files,
                &owner,
                patient,
                event.as_deref(),
                content_type.as_deref(),
            )
            .await
        }
        Commands::List {
            owner,
            event,
            patient,
            json,
        } => cmd_list(&config, &owner, event.as_deref(), patient, json).await,
        Commands::Download {
            id,
            owner,
            out,
            json,
        } => cmd_download(&config, &id, &owner, out.as_deref(), json).await,
        Commands::Delete { ids, owner } => cmd_delete(&config, &ids, &owner).await,
        Commands::Health => cmd_health(&config).await,
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &cli.config),
    }
}

// ── Config + logging ──────────────────────────────────────────────────────────

/// Returns the parsed config and whether the file existed.
async fn load_config(path: &Path) -> Result<(VaultConfig, bool)> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config: {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("parsing config: {}", path.display()))?;
        Ok((config, true))
    } else {
        Ok((VaultConfig::default(), false))
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

/// Expand `~` in path to the user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    match path.to_str().and_then(|s| s.strip_prefix("~/")) {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_default();
            Path::new(&home).join(rest)
        }
        None => path.to_path_buf(),
    }
}

// ── Service wiring ────────────────────────────────────────────────────────────

fn build_store(config: &VaultConfig) -> Result<BlobStore> {
    let creds = S3Credentials::from_env()?;
    let op = cvault_storage::operator::build_from_core_config(&config.storage, &creds)
        .context("building storage operator")?;
    Ok(BlobStore::new(op).with_backoff(
        config.lifecycle.poll_initial(),
        config.lifecycle.poll_max(),
    ))
}

async fn open_service(config: &VaultConfig) -> Result<Service> {
    let objects = build_store(config)?;
    let records_path = expand_tilde(&config.metadata.path);
    let refs = ReferenceCheck::from_config(&config.metadata);
    let metadata = JsonMetadataStore::open(&records_path, refs)
        .await
        .with_context(|| format!("opening record file: {}", records_path.display()))?;

    info!(
        bucket = %config.storage.bucket,
        records = %records_path.display(),
        concurrency = config.lifecycle.concurrency,
        "file service ready"
    );
    Ok(FileService::new(FileManager::new(
        objects,
        metadata,
        config.lifecycle.clone(),
    )))
}

/// Explicit `--content-type` wins; otherwise guess from the extension.
fn resolve_content_type(path: &Path, explicit: Option<&str>) -> String {
    match explicit {
        Some(ct) => ct.to_string(),
        None => mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string(),
    }
}

// ── `cvault save` ─────────────────────────────────────────────────────────────

async fn cmd_save(
    config: &VaultConfig,
    files: Vec<PathBuf>,
    owner: &str,
    patient: i64,
    event: Option<&str>,
    content_type: Option<&str>,
) -> Result<()> {
    let svc = open_service(config).await?;

    let uploads = files
        .into_iter()
        .map(|path| -> Result<UploadFile> {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .with_context(|| format!("not a file path: {}", path.display()))?;
            let ct = resolve_content_type(&path, content_type);
            Ok(UploadFile::from_path(name, ct, path))
        })
        .collect::<Result<Vec<_>>>()?;
    let total = uploads.len();

    let report = svc
        .manager()
        .save_files_report(uploads, owner, patient, event)
        .await;

    for record in &report.succeeded {
        println!("saved  {}  {}", record.id, record.storage_key);
    }
    for failure in &report.failed {
        eprintln!("failed {} ({}): {}", failure.item, failure.stage, failure.error);
    }
    println!();
    println!("Saved {} of {} files", report.succeeded.len(), total);

    if !report.is_complete() {
        anyhow::bail!("{} file(s) were not saved", report.failed.len());
    }
    Ok(())
}

// ── `cvault list` ─────────────────────────────────────────────────────────────

async fn cmd_list(
    config: &VaultConfig,
    owner: &str,
    event: Option<&str>,
    patient: Option<i64>,
    json: bool,
) -> Result<()> {
    let svc = open_service(config).await?;
    let who = Requester::new(owner);

    let files = match (event, patient) {
        (Some(ev), _) => svc.get_files_by_event(Some(&who), ev).await?,
        (None, Some(p)) => svc.get_files_by_patient(Some(&who), p).await?,
        (None, None) => svc.get_files(Some(&who)).await?,
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&files).context("serializing file list")?
        );
        return Ok(());
    }

    if files.is_empty() {
        println!("No files.");
        return Ok(());
    }
    for f in &files {
        print_summary(f);
    }
    println!();
    println!("{} file(s)", files.len());
    Ok(())
}

fn print_summary(f: &FileSummary) {
    println!(
        "{}  {:<32} patient={} event={} {} ({})",
        f.id,
        f.filename,
        f.patient_id,
        f.event_id.as_deref().unwrap_or("-"),
        f.content_type,
        f.owner_id,
    );
}

// ── `cvault download` ─────────────────────────────────────────────────────────

async fn cmd_download(
    config: &VaultConfig,
    id: &str,
    owner: &str,
    out: Option<&Path>,
    json: bool,
) -> Result<()> {
    let svc = open_service(config).await?;

    if json {
        let resp = svc.download_file(Some(&Requester::new(owner)), id).await;
        println!(
            "{}",
            serde_json::to_string_pretty(&resp).context("serializing download response")?
        );
        if !resp.success {
            std::process::exit(1);
        }
        return Ok(());
    }

    let file = svc
        .manager()
        .download_file(id, owner)
        .await
        .with_context(|| format!("downloading {id}"))?;

    let dst = out
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&file.filename));
    tokio::fs::write(&dst, &file.plaintext)
        .await
        .with_context(|| format!("writing {}", dst.display()))?;

    println!("Downloaded:");
    println!("  local:  {}", dst.display());
    println!("  type:   {}", file.content_type);
    println!("  bytes:  {}", file.plaintext.len());
    Ok(())
}

// ── `cvault delete` ───────────────────────────────────────────────────────────

async fn cmd_delete(config: &VaultConfig, ids: &[String], owner: &str) -> Result<()> {
    let svc = open_service(config).await?;
    let report = svc.manager().delete_files_report(ids, owner).await;

    for id in &report.succeeded {
        println!("deleted {id}");
    }
    for failure in &report.failed {
        eprintln!("failed  {} ({}): {}", failure.item, failure.stage, failure.error);
    }

    if !report.is_complete() {
        anyhow::bail!("{} file(s) were not deleted", report.failed.len());
    }
    Ok(())
}

// ── `cvault health` ───────────────────────────────────────────────────────────

async fn cmd_health(config: &VaultConfig) -> Result<()> {
    let store = build_store(config)?;
    cvault_storage::check_health(store.operator())
        .await
        .with_context(|| format!("storage at {} is not reachable", config.storage.endpoint))?;
    println!(
        "storage: ok ({} bucket {})",
        config.storage.endpoint, config.storage.bucket
    );
    Ok(())
}

// ── `cvault config show` ──────────────────────────────────────────────────────

fn cmd_config_show(config: &VaultConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
