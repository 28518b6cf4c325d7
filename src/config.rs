//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Keyring service name used for credential lookups.
const KEYRING_SERVICE: &str = "dropgate";

/// Remote backend protocol selection.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RemoteProtocol {
    /// FTP / FTPS control-and-data-channel backend.
    Ftp,
    /// HTTP object-store backend (PUT/GET/DELETE).
    Http,
}

/// TLS mode for the FTP backend.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FtpSecurity {
    /// Plain FTP, no TLS.
    Plain,
    /// Explicit FTPS: plain connect upgraded with `AUTH TLS`.
    Explicit,
}

/// Remote storage backend connectivity.
///
/// The password is loaded at runtime via OS keychain or environment
/// variable, never from the TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RemoteConfig {
    /// Backend protocol strategy.
    #[serde(default = "default_protocol")]
    pub protocol: RemoteProtocol,
    /// Remote host name.
    pub host: String,
    /// Remote port (21 for FTP).
    #[serde(default = "default_remote_port")]
    pub port: u16,
    /// TLS mode for FTP connections.
    #[serde(default = "default_ftp_security")]
    pub security: FtpSecurity,
    /// Login user name.
    pub username: String,
    /// Login password (populated at runtime).
    #[serde(skip)]
    pub password: String,
    /// Root directory under which session directories are created.
    #[serde(default = "default_root_dir")]
    pub root_dir: String,
}

fn default_protocol() -> RemoteProtocol {
    RemoteProtocol::Ftp
}

fn default_remote_port() -> u16 {
    21
}

fn default_ftp_security() -> FtpSecurity {
    FtpSecurity::Explicit
}

fn default_root_dir() -> String {
    "/uploads".into()
}

/// Upload size and extension limits plus session lifetime.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LimitsConfig {
    /// Maximum accepted file size in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    /// Lowercased extensions accepted by the upload path.
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    /// Hours a token stays usable after creation.
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: u32,
}

fn default_max_upload_bytes() -> u64 {
    500 * 1024 * 1024
}

fn default_allowed_extensions() -> Vec<String> {
    ["pdf", "jpg", "jpeg", "png", "zip", "txt"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

fn default_token_ttl_hours() -> u32 {
    72
}

/// Retry bounds and timeout scaling for the transfer client.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TransferConfig {
    /// Maximum push attempts per file before failing permanently.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Connect timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    /// Socket read/write timeout; aborts stalled transfers.
    #[serde(default = "default_io_timeout")]
    pub io_timeout_seconds: u64,
    /// Floor for the total per-push timeout.
    #[serde(default = "default_min_total_timeout")]
    pub min_total_timeout_seconds: u64,
    /// Minimum sustained throughput used to scale the total timeout.
    #[serde(default = "default_min_throughput")]
    pub min_throughput_bytes_per_sec: u64,
    /// Upper bound on concurrent outbound transfers.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: u32,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_connect_timeout() -> u64 {
    60
}

fn default_io_timeout() -> u64 {
    300
}

fn default_min_total_timeout() -> u64 {
    1800
}

fn default_min_throughput() -> u64 {
    1024
}

fn default_max_concurrent() -> u32 {
    4
}

/// Outbound notification settings.
///
/// When `smtp_host` is absent notifications are logged instead of sent.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct NotifyConfig {
    /// Recipient address for finalize notifications.
    pub recipient: String,
    /// Sender address.
    pub sender: String,
    /// SMTP relay host; logging-only sink when unset.
    #[serde(default)]
    pub smtp_host: Option<String>,
    /// SMTP relay port.
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// SMTP user name; anonymous relay when unset.
    #[serde(default)]
    pub smtp_username: Option<String>,
    /// SMTP password (populated at runtime).
    #[serde(skip)]
    pub smtp_password: String,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_http_port() -> u16 {
    8080
}

fn default_retention_days() -> u32 {
    30
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Directory holding the `SQLite` database and chunk scratch space.
    pub data_dir: PathBuf,
    /// Public base URL used when rendering upload links.
    pub base_url: String,
    /// HTTP port the API listens on.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Days after expiry before session records and scratch are purged.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Admin key authorizing session creation (populated at runtime).
    #[serde(skip)]
    pub admin_key: String,
    /// Remote storage backend settings.
    pub remote: RemoteConfig,
    /// Upload limits and session lifetime.
    #[serde(default = "LimitsConfig::default_values")]
    pub limits: LimitsConfig,
    /// Transfer retry and timeout settings.
    #[serde(default = "TransferConfig::default_values")]
    pub transfer: TransferConfig,
    /// Notification sink settings.
    pub notify: NotifyConfig,
}

impl LimitsConfig {
    fn default_values() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
            allowed_extensions: default_allowed_extensions(),
            token_ttl_hours: default_token_ttl_hours(),
        }
    }
}

impl TransferConfig {
    fn default_values() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            connect_timeout_seconds: default_connect_timeout(),
            io_timeout_seconds: default_io_timeout(),
            min_total_timeout_seconds: default_min_total_timeout(),
            min_throughput_bytes_per_sec: default_min_throughput(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load runtime credentials from OS keychain with env-var fallback.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the admin key or remote password
    /// cannot be found in either location. The SMTP password is optional
    /// and only required when an SMTP user is configured.
    pub async fn load_credentials(&mut self) -> Result<()> {
        self.admin_key = load_credential("admin_key", "DROPGATE_ADMIN_KEY").await?;
        self.remote.password =
            load_credential("remote_password", "DROPGATE_REMOTE_PASSWORD").await?;
        if self.notify.smtp_username.is_some() {
            self.notify.smtp_password =
                load_credential("smtp_password", "DROPGATE_SMTP_PASSWORD").await?;
        }
        Ok(())
    }

    /// Path of the `SQLite` database file.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("dropgate.db")
    }

    /// Root of the chunk scratch area.
    #[must_use]
    pub fn scratch_dir(&self) -> PathBuf {
        self.data_dir.join("scratch")
    }

    /// Validate that the caller-supplied key matches the admin key.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Unauthorized` on mismatch.
    pub fn ensure_admin(&self, key: &str) -> Result<()> {
        if !self.admin_key.is_empty() && key == self.admin_key {
            Ok(())
        } else {
            Err(AppError::Unauthorized("invalid admin key".into()))
        }
    }

    fn validate(&self) -> Result<()> {
        if self.remote.host.is_empty() {
            return Err(AppError::Config("remote.host must not be empty".into()));
        }
        if self.limits.token_ttl_hours == 0 {
            return Err(AppError::Config(
                "limits.token_ttl_hours must be greater than zero".into(),
            ));
        }
        if self.transfer.max_attempts == 0 {
            return Err(AppError::Config(
                "transfer.max_attempts must be greater than zero".into(),
            ));
        }
        if self.transfer.min_throughput_bytes_per_sec == 0 {
            return Err(AppError::Config(
                "transfer.min_throughput_bytes_per_sec must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // Keyring is synchronous I/O, so it runs on the blocking pool.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    env::var(env_key).map_err(|_| {
        AppError::Config(format!(
            "credential {keyring_key} not found in keychain or {env_key} env var"
        ))
    })
}
