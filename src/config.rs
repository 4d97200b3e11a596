//! Configuration types, built from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Input file extensions the decoder accepts.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "wav", "mp3", "mp4", "aac", "ac3", "aiff", "amr", "flac", "m4a", "ogg", "opus", "wma", "ts",
];

/// Default lookup service used to learn the worker's external address.
pub const DEFAULT_IPV4_LOOKUP_URL: &str = "http://ipv4bot.whatismyipaddress.com/";

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Task controller base URL, without trailing slash.
    pub controller_url: String,
    /// Port the callback server listens on.
    pub port: u16,
    /// How often to poll the controller for work.
    pub poll_interval: Duration,
    /// Queue this worker serves. Reservations for other queues are ignored.
    pub queue: String,
    pub language: String,
    /// Audio sampling rate label, always lower-case (e.g. `16khz`).
    pub sampling_rate: String,
    /// Root directory holding `input/`, `output/` and `details/`.
    pub work_dir: PathBuf,
    /// How long the decoder has to report `STARTING` once input is staged.
    pub decoder_start_timeout: Duration,
    /// Per-request timeout for controller calls.
    pub controller_timeout: Duration,
    pub ipv4_lookup_url: String,
    pub storage: StorageConfig,
}

/// Where decoder output archives are uploaded.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    Aws {
        bucket: String,
        region: String,
        access_key_id: Option<String>,
        secret_access_key: Option<SecretString>,
    },
    Azure {
        account: String,
        access_key: SecretString,
        container: String,
    },
    Local {
        path: PathBuf,
    },
}

impl StorageConfig {
    /// Backend name as written in `USE_STORAGE`.
    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Aws { .. } => "aws",
            Self::Azure { .. } => "azure",
            Self::Local { .. } => "local",
        }
    }

    fn from_source(env: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let backend = required(env, "USE_STORAGE")?;
        match backend.to_lowercase().as_str() {
            "aws" => Ok(Self::Aws {
                bucket: required(env, "AWS_BUCKET")?,
                region: env("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string()),
                access_key_id: env("AWS_ACCESS_KEY_ID"),
                secret_access_key: env("AWS_SECRET_ACCESS_KEY").map(SecretString::from),
            }),
            "azure" => Ok(Self::Azure {
                account: required(env, "AZURE_ACCOUNT")?,
                access_key: SecretString::from(required(env, "AZURE_ACCOUNT_KEY")?),
                container: required(env, "AZURE_CONTAINER")?,
            }),
            "local" => Ok(Self::Local {
                path: env("LOCAL_STORAGE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("./uploads")),
            }),
            other => Err(ConfigError::InvalidValue {
                key: "USE_STORAGE".to_string(),
                message: format!("expected aws, azure or local, got {other:?}"),
            }),
        }
    }
}

impl WorkerConfig {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(&|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_source(env: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let controller_url = required(env, "TASKCONTROLLER_URL")?
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            controller_url,
            port: parsed(env, "PORT", 8080)?,
            poll_interval: Duration::from_millis(parsed(env, "POLLING_PERIOD", 10_000)?),
            queue: env("WORKER_QUEUE").unwrap_or_else(|| "normal".to_string()),
            language: env("WORKER_LANGUAGE").unwrap_or_else(|| "english".to_string()),
            sampling_rate: env("WORKER_SAMPLING_RATE")
                .map(|s| s.to_lowercase())
                .unwrap_or_else(|| "16khz".to_string()),
            work_dir: env("WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            decoder_start_timeout: Duration::from_secs(parsed(
                env,
                "DECODER_START_TIMEOUT_SECS",
                30,
            )?),
            controller_timeout: Duration::from_secs(parsed(env, "CONTROLLER_TIMEOUT_SECS", 30)?),
            ipv4_lookup_url: env("IPV4_LOOKUP_URL")
                .unwrap_or_else(|| DEFAULT_IPV4_LOOKUP_URL.to_string()),
            storage: StorageConfig::from_source(env)?,
        })
    }
}

fn required(env: &dyn Fn(&str) -> Option<String>, key: &str) -> Result<String, ConfigError> {
    env(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

fn parsed<T>(env: &dyn Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}
