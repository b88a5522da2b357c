//! Worker Configuration
//!
//! Resolved once at startup and immutable afterwards. Values come from the
//! command line, optionally layered over a YAML/JSON config file.
//!
//! ```text
//! WorkerConfig
//!   ├─ NetworkConfig (socket kind, address, framing limits)
//!   ├─ ModelConfig   (runtime type, device type, model directory)
//!   └─ LoggingConfig (log level)
//! ```

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::parser::ValueSource;
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser};
use serde::{Deserialize, Serialize};
use serve_protocol::DEFAULT_MAX_FRAME_LEN;

use crate::base::error::InitError;

/// Smallest frame limit that still carries an empty `Error` response.
pub const MIN_FRAME_LEN: usize = 64;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Top-level worker configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Parser)]
#[command(name = "serve-worker")]
#[command(about = "Model worker - serves one model over a TCP or Unix-domain socket", long_about = None)]
#[serde(default)]
pub struct WorkerConfig {
    #[command(flatten)]
    pub network: NetworkConfig,

    #[command(flatten)]
    pub model: ModelConfig,

    #[command(flatten)]
    pub logging: LoggingConfig,

    /// Optional YAML or JSON file; command-line values take precedence
    #[arg(long, value_name = "FILE")]
    #[serde(skip)]
    pub config_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[serde(default)]
pub struct NetworkConfig {
    /// Socket kind: "tcp" or "unix"
    #[arg(long, default_value = "tcp")]
    pub sock_type: String,

    /// Socket path for "unix" sockets
    ///
    /// Example: "/tmp/.ts.sock.9000"
    #[arg(long)]
    pub sock_name: Option<String>,

    /// Listen host for "tcp" sockets
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Listen port for "tcp" sockets
    #[arg(long, default_value = "9000")]
    pub port: String,

    /// Largest accepted frame payload in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_LEN)]
    pub max_frame_len: usize,

    /// Close the connection after this many idle seconds
    #[arg(long)]
    pub idle_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[serde(default)]
pub struct ModelConfig {
    /// Runtime type used when LOAD does not name one ("echo", "linear")
    #[arg(long, default_value = "linear")]
    pub runtime_type: String,

    /// Device type used when LOAD does not name one ("cpu", "gpu", "cuda:N")
    #[arg(long, default_value = "cpu")]
    pub device_type: String,

    /// Model directory used when LOAD does not name one
    #[arg(long)]
    pub model_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl LoggingConfig {
    /// The configured level as a filter directive, or `None` when it is not
    /// one of the known levels.
    pub fn level(&self) -> Option<&'static str> {
        let level = self.log_level.to_ascii_lowercase();
        LOG_LEVELS.iter().copied().find(|known| *known == level)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            sock_type: "tcp".to_string(),
            sock_name: None,
            host: "127.0.0.1".to_string(),
            port: "9000".to_string(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            idle_timeout_secs: None,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            runtime_type: "linear".to_string(),
            device_type: "cpu".to_string(),
            model_dir: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Listening endpoint resolved from `NetworkConfig`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketAddress {
    Tcp { host: String, port: u16 },
    Unix(PathBuf),
}

impl fmt::Display for SocketAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketAddress::Tcp { host, port } => write!(f, "tcp://{}:{}", host, port),
            SocketAddress::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

impl NetworkConfig {
    pub fn socket_address(&self) -> Result<SocketAddress, InitError> {
        match self.sock_type.trim().to_ascii_lowercase().as_str() {
            "tcp" => {
                if self.host.trim().is_empty() {
                    return Err(InitError::InvalidConfig("tcp socket requires a host".into()));
                }
                let port = self.port.trim().parse::<u16>().map_err(|_| {
                    InitError::InvalidConfig(format!("invalid tcp port: {:?}", self.port))
                })?;
                Ok(SocketAddress::Tcp {
                    host: self.host.trim().to_string(),
                    port,
                })
            }
            "unix" => match self.sock_name.as_deref().map(str::trim) {
                Some(name) if !name.is_empty() => Ok(SocketAddress::Unix(PathBuf::from(name))),
                _ => Err(InitError::InvalidConfig(
                    "unix socket requires --sock-name".into(),
                )),
            },
            other => Err(InitError::InvalidConfig(format!(
                "unknown socket type: {:?} (expected \"tcp\" or \"unix\")",
                other
            ))),
        }
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }
}

impl WorkerConfig {
    /// Parse the process arguments and merge the optional config file.
    pub fn load() -> Result<Self> {
        Self::load_from(std::env::args_os())
    }

    pub fn load_from<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = match Self::command().try_get_matches_from(args) {
            Ok(matches) => matches,
            Err(e)
                if matches!(
                    e.kind(),
                    clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
                ) =>
            {
                e.exit()
            }
            Err(e) => return Err(e.into()),
        };
        let mut config = Self::from_arg_matches(&matches)?;

        if let Some(path) = config.config_file.clone() {
            let file_config = Self::from_file(&path)?;
            config = config.merge_with(file_config, &matches);
        }

        config
            .validate()
            .context("Invalid worker configuration")?;
        Ok(config)
    }

    /// Load from a YAML or JSON file, chosen by extension.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&content).context("Failed to parse YAML config")
            }
            Some("json") => serde_json::from_str(&content).context("Failed to parse JSON config"),
            _ => anyhow::bail!("Unsupported config file format (use .yaml, .yml, or .json)"),
        }
    }

    /// Take each value from `file` unless it was given on the command line.
    fn merge_with(mut self, file: Self, matches: &ArgMatches) -> Self {
        let from_cli = |id: &str| {
            matches!(
                matches.value_source(id),
                Some(ValueSource::CommandLine) | Some(ValueSource::EnvVariable)
            )
        };

        let WorkerConfig {
            network,
            model,
            logging,
            ..
        } = file;

        if !from_cli("sock_type") {
            self.network.sock_type = network.sock_type;
        }
        if !from_cli("sock_name") {
            self.network.sock_name = network.sock_name;
        }
        if !from_cli("host") {
            self.network.host = network.host;
        }
        if !from_cli("port") {
            self.network.port = network.port;
        }
        if !from_cli("max_frame_len") {
            self.network.max_frame_len = network.max_frame_len;
        }
        if !from_cli("idle_timeout_secs") {
            self.network.idle_timeout_secs = network.idle_timeout_secs;
        }
        if !from_cli("runtime_type") {
            self.model.runtime_type = model.runtime_type;
        }
        if !from_cli("device_type") {
            self.model.device_type = model.device_type;
        }
        if !from_cli("model_dir") {
            self.model.model_dir = model.model_dir;
        }
        if !from_cli("log_level") {
            self.logging.log_level = logging.log_level;
        }
        self
    }

    pub fn validate(&self) -> Result<(), InitError> {
        self.network.socket_address()?;

        if self.network.max_frame_len < MIN_FRAME_LEN {
            return Err(InitError::InvalidConfig(format!(
                "max_frame_len must be at least {} bytes",
                MIN_FRAME_LEN
            )));
        }
        if self.network.max_frame_len > u32::MAX as usize {
            return Err(InitError::InvalidConfig(format!(
                "max_frame_len must fit the u32 length prefix (<= {})",
                u32::MAX
            )));
        }
        if self.network.idle_timeout_secs == Some(0) {
            return Err(InitError::InvalidConfig(
                "idle_timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    pub fn print_summary(&self) {
        tracing::info!("Worker configuration:");
        match self.network.socket_address() {
            Ok(address) => tracing::info!("  Listen:      {}", address),
            Err(e) => tracing::info!("  Listen:      <{}>", e),
        }
        tracing::info!("  Max frame:   {} bytes", self.network.max_frame_len);
        if let Some(idle) = self.network.idle_timeout_secs {
            tracing::info!("  Idle close:  {}s", idle);
        }
        tracing::info!(
            "  Runtime:     {} on {}",
            self.model.runtime_type,
            self.model.device_type
        );
        match &self.model.model_dir {
            Some(dir) => tracing::info!("  Model dir:   {}", dir.display()),
            None => tracing::info!("  Model dir:   <from LOAD>"),
        }
    }
}
