//! API configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `API_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `API_BASE_URL` - Public URL of the API, used to build pagination links
//! - `TINIFY_API_KEY` - Tinify key (when `IMAGE_OPTIMIZER=tinify`)
//! - `OPTIMIZER_COMMAND` - Optimizer command line (when `IMAGE_OPTIMIZER=command`)
//!
//! ## Optional
//! - `API_HOST` - Bind address (default: 127.0.0.1)
//! - `API_PORT` - Listen port (default: 8000)
//! - `STORAGE_ROOT` - Durable photo storage root (default: storage/app/public)
//! - `STORAGE_PUBLIC_URL` - Public URL prefix for stored files (default: `{API_BASE_URL}/storage`)
//! - `PHOTO_TEMP_DIR` - Scratch directory for in-flight images (default: storage/app/tmp)
//! - `PHOTO_MAX_BYTES` - Upload ceiling in bytes (default: 5242880)
//! - `PHOTO_ALLOWED_FORMATS` - Comma-separated list of `jpeg`, `png` (default: jpeg)
//! - `PHOTO_REQUIRED_ON_CREATE` - Whether registration demands a photo (default: true)
//! - `REGISTRATION_TOKEN_TTL_MINUTES` - Registration token lifetime (default: 40)
//! - `REQUIRE_REGISTRATION_TOKEN` - Gate write routes behind a token (default: true)
//! - `IMAGE_OPTIMIZER` - `tinify` or `command` (default: tinify)
//! - `TINIFY_ENDPOINT` - Shrink endpoint (default: <https://api.tinify.com/shrink>)
//! - `OPTIMIZER_TIMEOUT_SECS` - Bound on one optimization call (default: 30)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use crate::services::photo::PhotoFormat;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Default Tinify shrink endpoint.
pub const DEFAULT_TINIFY_ENDPOINT: &str = "https://api.tinify.com/shrink";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// API application configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL of the API, without trailing slash
    pub base_url: String,
    /// Durable photo storage
    pub storage: StorageConfig,
    /// Upload rules and scratch space for the photo pipeline
    pub photo: PhotoConfig,
    /// Registration token gate
    pub registration: RegistrationConfig,
    /// External image optimizer
    pub optimizer: OptimizerConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Where optimized photos are kept and how they are addressed publicly.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory; photos land in `<root>/photos/`
    pub root: PathBuf,
    /// URL prefix that `<root>` is served under
    pub public_url: String,
}

/// Photo upload rules.
#[derive(Debug, Clone)]
pub struct PhotoConfig {
    /// Directory for per-request temporary files
    pub temp_dir: PathBuf,
    /// Largest accepted upload in bytes
    pub max_bytes: usize,
    /// Accepted upload encodings
    pub allowed_formats: Vec<PhotoFormat>,
    /// Whether a photo must accompany registration
    pub required_on_create: bool,
}

impl Default for PhotoConfig {
    fn default() -> Self {
        Self {
            temp_dir: PathBuf::from("storage/app/tmp"),
            max_bytes: 5 * 1024 * 1024,
            allowed_formats: vec![PhotoFormat::Jpeg],
            required_on_create: true,
        }
    }
}

/// Registration token gate settings.
#[derive(Debug, Clone, Copy)]
pub struct RegistrationConfig {
    /// How long an issued token stays valid
    pub token_ttl: Duration,
    /// Whether write routes demand a token at all
    pub require_token: bool,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            token_ttl: Duration::from_secs(40 * 60),
            require_token: true,
        }
    }
}

/// Which image optimizer integration to use.
#[derive(Debug, Clone)]
pub enum OptimizerConfig {
    /// Tinify HTTP API: upload, then download the result URL.
    Tinify(TinifyConfig),
    /// Local program that reads `{input}` and writes `{output}`.
    Command(CommandConfig),
}

/// Tinify HTTP API configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct TinifyConfig {
    /// API key, sent as the basic-auth password for user `api`
    pub api_key: SecretString,
    /// Shrink endpoint URL
    pub endpoint: String,
    /// Bound on the upload and on the result download
    pub timeout: Duration,
}

impl std::fmt::Debug for TinifyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TinifyConfig")
            .field("api_key", &"[REDACTED]")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Local optimizer program configuration.
#[derive(Debug, Clone)]
pub struct CommandConfig {
    /// Executable name or path
    pub program: String,
    /// Arguments; `{input}` and `{output}` are substituted per call
    pub args: Vec<String>,
    /// Bound on one run of the program
    pub timeout: Duration,
}

impl CommandConfig {
    /// Placeholder replaced by the staged input path.
    pub const INPUT_PLACEHOLDER: &'static str = "{input}";
    /// Placeholder replaced by the path the program must write.
    pub const OUTPUT_PLACEHOLDER: &'static str = "{output}";

    /// Parse a whitespace-separated command line such as
    /// `jpegoptim --stdout {input} > {output}`-free forms like `cjpeg -outfile {output} {input}`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if the line is empty or lacks a placeholder.
    pub fn parse(var_name: &str, line: &str, timeout: Duration) -> Result<Self, ConfigError> {
        let mut parts = line.split_whitespace().map(str::to_owned);
        let program = parts.next().ok_or_else(|| {
            ConfigError::InvalidEnvVar(var_name.to_string(), "command is empty".to_string())
        })?;
        let args: Vec<String> = parts.collect();

        for placeholder in [Self::INPUT_PLACEHOLDER, Self::OUTPUT_PLACEHOLDER] {
            if !args.iter().any(|arg| arg.contains(placeholder)) {
                return Err(ConfigError::InvalidEnvVar(
                    var_name.to_string(),
                    format!("command must reference {placeholder}"),
                ));
            }
        }

        Ok(Self {
            program,
            args,
            timeout,
        })
    }
}

impl ApiConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("API_DATABASE_URL")?;
        let host = parse_env("API_HOST", "127.0.0.1")?;
        let port = parse_env("API_PORT", "8000")?;
        let base_url = parse_base_url("API_BASE_URL", &get_required_env("API_BASE_URL")?)?;

        let storage = StorageConfig {
            root: PathBuf::from(get_env_or_default("STORAGE_ROOT", "storage/app/public")),
            public_url: get_optional_env("STORAGE_PUBLIC_URL").map_or_else(
                || format!("{base_url}/storage"),
                |url| url.trim_end_matches('/').to_string(),
            ),
        };

        let photo = PhotoConfig {
            temp_dir: PathBuf::from(get_env_or_default("PHOTO_TEMP_DIR", "storage/app/tmp")),
            max_bytes: parse_env("PHOTO_MAX_BYTES", "5242880")?,
            allowed_formats: parse_formats(
                "PHOTO_ALLOWED_FORMATS",
                &get_env_or_default("PHOTO_ALLOWED_FORMATS", "jpeg"),
            )?,
            required_on_create: parse_bool(
                "PHOTO_REQUIRED_ON_CREATE",
                &get_env_or_default("PHOTO_REQUIRED_ON_CREATE", "true"),
            )?,
        };

        let ttl_minutes: u64 = parse_env("REGISTRATION_TOKEN_TTL_MINUTES", "40")?;
        if ttl_minutes == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "REGISTRATION_TOKEN_TTL_MINUTES".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let registration = RegistrationConfig {
            token_ttl: Duration::from_secs(ttl_minutes * 60),
            require_token: parse_bool(
                "REQUIRE_REGISTRATION_TOKEN",
                &get_env_or_default("REQUIRE_REGISTRATION_TOKEN", "true"),
            )?,
        };

        let optimizer = OptimizerConfig::from_env()?;

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            storage,
            photo,
            registration,
            optimizer,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl OptimizerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let timeout = Duration::from_secs(parse_env("OPTIMIZER_TIMEOUT_SECS", "30")?);

        match get_env_or_default("IMAGE_OPTIMIZER", "tinify").as_str() {
            "tinify" => Ok(Self::Tinify(TinifyConfig {
                api_key: get_validated_secret("TINIFY_API_KEY")?,
                endpoint: get_env_or_default("TINIFY_ENDPOINT", DEFAULT_TINIFY_ENDPOINT),
                timeout,
            })),
            "command" => Ok(Self::Command(CommandConfig::parse(
                "OPTIMIZER_COMMAND",
                &get_required_env("OPTIMIZER_COMMAND")?,
                timeout,
            )?)),
            other => Err(ConfigError::InvalidEnvVar(
                "IMAGE_OPTIMIZER".to_string(),
                format!("unknown optimizer '{other}' (expected 'tinify' or 'command')"),
            )),
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable (or its default) with `FromStr`.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Parse a boolean flag (`true/false`, `1/0`, `yes/no`).
fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("'{other}' is not a boolean"),
        )),
    }
}

/// Validate the public base URL and strip any trailing slash.
fn parse_base_url(key: &str, value: &str) -> Result<String, ConfigError> {
    let url = Url::parse(value.trim())
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must be an http(s) URL".to_string(),
        ));
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

/// Parse the comma-separated list of accepted photo encodings.
fn parse_formats(key: &str, value: &str) -> Result<Vec<PhotoFormat>, ConfigError> {
    let mut formats = Vec::new();
    for name in value.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let format = PhotoFormat::from_name(name).ok_or_else(|| {
            ConfigError::InvalidEnvVar(key.to_string(), format!("unsupported format '{name}'"))
        })?;
        if !formats.contains(&format) {
            formats.push(format);
        }
    }
    if formats.is_empty() {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "at least one format is required".to_string(),
        ));
    }
    Ok(formats)
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use the key issued by the provider."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
