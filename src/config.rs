use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::{env, fmt, str::FromStr, time::Duration};
use uuid::Uuid;

use crate::services::{
    batch_coordinator::DEFAULT_BATCH_PARALLELISM, content_validator::ReencodeLimits,
    upload_pipeline::PipelineConfig,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Payloads on local disk under `storage_dir`.
    Disk,
    /// Payloads in process memory; lost on restart.
    Memory,
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "disk" => Ok(Backend::Disk),
            "memory" => Ok(Backend::Memory),
            other => bail!("unknown backend `{}` (expected disk or memory)", other),
        }
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub backend: Backend,
    pub storage_dir: String,
    pub staging_dir: String,
    /// Externally reachable base URL, used when minting signed URLs.
    pub public_base_url: String,
    pub signing_secret: String,
    pub read_url_ttl_secs: u64,
    pub batch_parallelism: usize,
    pub max_image_dimension: u32,
    pub jpeg_quality: u8,
    pub max_upload_bytes: usize,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("backend", &self.backend)
            .field("storage_dir", &self.storage_dir)
            .field("staging_dir", &self.staging_dir)
            .field("public_base_url", &self.public_base_url)
            .field("signing_secret", &"<redacted>")
            .field("read_url_ttl_secs", &self.read_url_ttl_secs)
            .field("batch_parallelism", &self.batch_parallelism)
            .field("max_image_dimension", &self.max_image_dimension)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish()
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "File upload and metadata service")]
pub struct Args {
    /// Host to bind to (overrides FILEVAULT_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides FILEVAULT_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Object store backend (overrides FILEVAULT_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// Directory where objects are stored (overrides FILEVAULT_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Directory for in-flight upload bodies (overrides FILEVAULT_STAGING_DIR)
    #[arg(long)]
    pub staging_dir: Option<String>,

    /// Base URL used in signed links (overrides FILEVAULT_PUBLIC_BASE_URL)
    #[arg(long)]
    pub public_base_url: Option<String>,

    /// Concurrent files per batch upload (overrides FILEVAULT_BATCH_PARALLELISM)
    #[arg(long)]
    pub batch_parallelism: Option<usize>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::from_args(Args::parse())
    }

    pub fn from_args(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = env::var("FILEVAULT_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_parse("FILEVAULT_PORT", 3000u16)?;
        let env_backend = env_parse("FILEVAULT_BACKEND", Backend::Disk)?;
        let env_storage =
            env::var("FILEVAULT_STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into());
        let env_staging =
            env::var("FILEVAULT_STAGING_DIR").unwrap_or_else(|_| "./data/staging".into());
        let env_batch = env_parse("FILEVAULT_BATCH_PARALLELISM", DEFAULT_BATCH_PARALLELISM)?;

        let port = args.port.unwrap_or(env_port);
        let env_base_url = env::var("FILEVAULT_PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{}", port));

        let signing_secret = match env::var("FILEVAULT_SIGNING_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                tracing::warn!(
                    "FILEVAULT_SIGNING_SECRET not set; signed URLs will not survive a restart"
                );
                Uuid::new_v4().to_string()
            }
        };

        let limits = ReencodeLimits::default();

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port,
            backend: args.backend.unwrap_or(env_backend),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            staging_dir: args.staging_dir.unwrap_or(env_staging),
            public_base_url: args.public_base_url.unwrap_or(env_base_url),
            signing_secret,
            read_url_ttl_secs: env_parse("FILEVAULT_READ_URL_TTL_SECS", 3600)?,
            batch_parallelism: args.batch_parallelism.unwrap_or(env_batch).max(1),
            max_image_dimension: env_parse("FILEVAULT_MAX_IMAGE_DIMENSION", limits.max_dimension)?,
            jpeg_quality: env_parse("FILEVAULT_JPEG_QUALITY", limits.jpeg_quality)?,
            max_upload_bytes: env_parse("FILEVAULT_MAX_UPLOAD_BYTES", 100 * 1024 * 1024)?,
        };

        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            read_url_ttl: Duration::from_secs(self.read_url_ttl_secs),
            ..PipelineConfig::default()
        }
    }

    pub fn reencode_limits(&self) -> ReencodeLimits {
        ReencodeLimits {
            max_dimension: self.max_image_dimension,
            jpeg_quality: self.jpeg_quality.clamp(1, 100),
        }
    }
}

/// Read `name` from the environment, falling back to `default` when unset.
fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}
