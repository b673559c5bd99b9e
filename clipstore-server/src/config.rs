//! Configuration for the clipstore server.
//!
//! Configuration is loaded from the following sources, in order of precedence (highest first):
//!
//! 1. Environment variables (prefixed with `CS__`)
//! 2. YAML configuration file (specified via `-c` or `--config` flag)
//! 3. Defaults
//!
//! See [`Config`] for a description of all configuration fields and their defaults.
//!
//! # Environment Variables
//!
//! Environment variables use `CS__` as a prefix and double underscores (`__`) to denote nested
//! configuration structures. For example:
//!
//! - `CS__HTTP_ADDR=0.0.0.0:8080` sets the HTTP server address
//! - `CS__STORAGE__TYPE=filesystem` sets the storage type
//! - `CS__STORAGE__PATH=/data` sets the storage directory
//! - `CS__UPLOAD__TIMEOUT=30m` sets the stale upload timeout
//!
//! # YAML Configuration File
//!
//! The above configuration in YAML format would look like this:
//!
//! ```yaml
//! http_addr: 0.0.0.0:8080
//!
//! storage:
//!   type: filesystem
//!   path: /data
//!
//! upload:
//!   timeout: 30m
//! ```

use std::borrow::Cow;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use bytesize::ByteSize;
use clipstore_service::chunks::DEFAULT_CHUNK_SIZE;
use clipstore_service::gateway::GatewayOptions;
use clipstore_service::reaper::{DEFAULT_REAPER_INTERVAL, DEFAULT_UPLOAD_TIMEOUT};
use figment::providers::{Env, Format, Serialized, Yaml};
use secrecy::{CloneableSecret, SecretBox, SerializableSecret, zeroize::Zeroize};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "CS__";

/// A configured secret, such as the Sentry DSN.
///
/// Wrap it in a [`SecretBox`] so it is redacted from `Debug` output and zeroed when dropped.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ConfigSecret(String);

impl ConfigSecret {
    /// Returns the secret value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ConfigSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ConfigSecret(..)")
    }
}

impl Zeroize for ConfigSecret {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

impl CloneableSecret for ConfigSecret {}
impl SerializableSecret for ConfigSecret {}

/// Storage engine configuration.
///
/// The `type` field in YAML or `CS__STORAGE__TYPE` in environment variables determines which
/// variant is used.
///
/// Used in: [`Config::storage`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Storage {
    /// Local filesystem storage (type `"filesystem"`).
    ///
    /// Chunks are stored as files and documents as small revisioned files below `path`. Suitable
    /// for single-server deployments.
    ///
    /// ```yaml
    /// storage:
    ///   type: filesystem
    ///   path: /data
    /// ```
    FileSystem {
        /// Directory path for storing chunks and documents.
        ///
        /// The directory is created if it doesn't exist. Relative paths are resolved from the
        /// server's working directory.
        ///
        /// # Default
        ///
        /// `"data"`
        ///
        /// # Environment Variable
        ///
        /// `CS__STORAGE__PATH`
        path: PathBuf,
    },

    /// In-memory storage (type `"memory"`).
    ///
    /// All data is lost when the server stops. Use only for development and tests.
    Memory,
}

/// Upload lifecycle configuration.
///
/// Used in: [`Config::upload`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Upload {
    /// Age after which an unfinished upload is considered abandoned and purged.
    ///
    /// Uploads are normally rolled back as soon as they fail. This timeout only covers uploads
    /// that stalled or whose rollback failed.
    ///
    /// # Default
    ///
    /// `1h`
    ///
    /// # Environment Variable
    ///
    /// `CS__UPLOAD__TIMEOUT`
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Interval between two runs of the stale upload reaper.
    ///
    /// # Default
    ///
    /// `60s`
    ///
    /// # Environment Variable
    ///
    /// `CS__UPLOAD__REAPER_INTERVAL`
    #[serde(with = "humantime_serde")]
    pub reaper_interval: Duration,
}

impl Default for Upload {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_UPLOAD_TIMEOUT,
            reaper_interval: DEFAULT_REAPER_INTERVAL,
        }
    }
}

/// Runtime configuration for the Tokio async runtime.
///
/// Used in: [`Config::runtime`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Runtime {
    /// Number of worker threads for the server runtime.
    ///
    /// Uploads and downloads are I/O bound, so the default is usually sufficient.
    ///
    /// # Default
    ///
    /// Defaults to the number of CPU cores on the host machine.
    ///
    /// # Environment Variable
    ///
    /// `CS__RUNTIME__WORKER_THREADS`
    pub worker_threads: usize,
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get(),
        }
    }
}

/// [Sentry](https://sentry.io/) error tracking configuration.
///
/// Sentry is disabled by default and only enabled when a DSN is provided.
///
/// Used in: [`Config::sentry`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Sentry {
    /// Sentry DSN (Data Source Name).
    ///
    /// # Default
    ///
    /// `None` (Sentry disabled)
    ///
    /// # Environment Variable
    ///
    /// `CS__SENTRY__DSN`
    pub dsn: Option<SecretBox<ConfigSecret>>,

    /// Environment name for this deployment, such as `"production"`.
    ///
    /// # Environment Variable
    ///
    /// `CS__SENTRY__ENVIRONMENT`
    pub environment: Option<Cow<'static, str>>,

    /// Error event sampling rate between `0.0` and `1.0`.
    ///
    /// # Default
    ///
    /// `1.0` (send all errors)
    ///
    /// # Environment Variable
    ///
    /// `CS__SENTRY__SAMPLE_RATE`
    pub sample_rate: f32,

    /// Performance trace sampling rate between `0.0` and `1.0`.
    ///
    /// # Default
    ///
    /// `0.01`
    ///
    /// # Environment Variable
    ///
    /// `CS__SENTRY__TRACES_SAMPLE_RATE`
    pub traces_sample_rate: f32,
}

impl Sentry {
    /// Returns whether Sentry integration is enabled.
    pub fn is_enabled(&self) -> bool {
        self.dsn.is_some()
    }
}

impl Default for Sentry {
    fn default() -> Self {
        Self {
            dsn: None,
            environment: None,
            sample_rate: 1.0,
            traces_sample_rate: 0.01,
        }
    }
}

/// Log output format.
///
/// The format can be explicitly specified or auto-detected based on whether output is to a TTY.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,

    /// Pretty printing with colors.
    Pretty,

    /// Simplified plain text output.
    ///
    /// ```text
    /// 2025-01-04T12:10:32Z INFO clipstore_server::web::server: HTTP server listening
    /// ```
    Simplified,

    /// JSON lines.
    Json,
}

/// Serializes a [`LevelFilter`] by its name, such as `"debug"`.
mod level_filter {
    use std::borrow::Cow;

    use serde::{Deserialize, Deserializer, Serializer};
    use tracing::level_filters::LevelFilter;

    pub fn serialize<S: Serializer>(level: &LevelFilter, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(level)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<LevelFilter, D::Error> {
        let name = Cow::<'de, str>::deserialize(deserializer)?;
        name.parse().map_err(|_| {
            serde::de::Error::invalid_value(
                serde::de::Unexpected::Str(&name),
                &"one of trace, debug, info, warn, error, off",
            )
        })
    }
}

/// Logging configuration.
///
/// Logs are always written to stderr.
///
/// Used in: [`Config::logging`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Logging {
    /// Minimum log level to output.
    ///
    /// Valid levels in increasing severity: TRACE, DEBUG, INFO, WARN, ERROR, OFF. The `RUST_LOG`
    /// environment variable provides more granular control per module if needed.
    ///
    /// # Default
    ///
    /// `INFO`
    ///
    /// # Environment Variable
    ///
    /// `CS__LOGGING__LEVEL`
    #[serde(with = "level_filter")]
    pub level: LevelFilter,

    /// Log output format. See [`LogFormat`].
    ///
    /// # Default
    ///
    /// `auto`
    ///
    /// # Environment Variable
    ///
    /// `CS__LOGGING__FORMAT`
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

/// Main configuration struct for the clipstore server.
///
/// See the [module documentation](self) for how configuration is loaded.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server bind address.
    ///
    /// # Default
    ///
    /// `0.0.0.0:5000`
    ///
    /// # Environment Variable
    ///
    /// `CS__HTTP_ADDR`
    pub http_addr: SocketAddr,

    /// Externally reachable base URL of this server.
    ///
    /// Used to build playback URLs of the form `{public_url}/videos/{objectId}` in video records.
    ///
    /// # Default
    ///
    /// `http://localhost:5000`
    ///
    /// # Environment Variable
    ///
    /// `CS__PUBLIC_URL`
    pub public_url: String,

    /// Storage engine for chunks, the object catalog and video records.
    ///
    /// # Default
    ///
    /// Filesystem storage in the `data` directory.
    pub storage: Storage,

    /// Size of chunks that uploads are split into.
    ///
    /// At most one chunk per upload and download is held in memory.
    ///
    /// # Default
    ///
    /// `1 MiB`
    ///
    /// # Environment Variable
    ///
    /// `CS__CHUNK_SIZE`
    pub chunk_size: ByteSize,

    /// Maximum size of a single uploaded video. Unlimited if unset.
    ///
    /// # Environment Variable
    ///
    /// `CS__MAX_UPLOAD_SIZE`
    pub max_upload_size: Option<ByteSize>,

    /// Whether deleting a video record also deletes the stored video.
    ///
    /// # Default
    ///
    /// `true`
    ///
    /// # Environment Variable
    ///
    /// `CS__CASCADE_DELETE`
    pub cascade_delete: bool,

    /// Upload lifecycle settings. See [`Upload`].
    pub upload: Upload,

    /// Runtime settings. See [`Runtime`].
    pub runtime: Runtime,

    /// Logging settings. See [`Logging`].
    pub logging: Logging,

    /// Sentry settings. See [`Sentry`].
    pub sentry: Sentry,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            public_url: "http://localhost:5000".to_owned(),
            storage: Storage::FileSystem {
                path: PathBuf::from("data"),
            },
            chunk_size: ByteSize::b(DEFAULT_CHUNK_SIZE),
            max_upload_size: None,
            cascade_delete: true,
            upload: Upload::default(),
            runtime: Runtime::default(),
            logging: Logging::default(),
            sentry: Sentry::default(),
        }
    }
}

impl Config {
    /// Loads configuration from defaults, an optional YAML file and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML file cannot be read or parsed, or if any source contains
    /// invalid values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }

    /// Returns the options for the streaming gateway.
    pub fn gateway_options(&self) -> GatewayOptions {
        GatewayOptions {
            chunk_size: self.chunk_size.as_u64(),
            max_upload_size: self.max_upload_size.map(|size| size.as_u64()),
            cascade_delete: self.cascade_delete,
        }
    }
}
