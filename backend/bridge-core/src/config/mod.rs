use crate::dispatch::DispatchOptions;
use crate::error::config::ConfigError;
use crate::executor::MAX_OUTPUT_SIZE;
use crate::history::DEFAULT_MAX_RECORDS;
use crate::retry::RetryConfig;
use crate::{DEFAULT_HOST, DEFAULT_PORT};

use common::ErrorLocation;

use std::panic::Location;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

const CONFIG_FILE_NAME: &str = "bridge.json";
const CONFIG_DIR_NAME: &str = "aether";
const CONFIG_VERSION: u32 = 1;

pub const ENV_HOST: &str = "AETHER_BRIDGE_HOST";
pub const ENV_PORT: &str = "AETHER_BRIDGE_PORT";

// ============================================
// CONFIG SECTIONS
// ============================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    /// `host:port`, ready for binding or connecting.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSettings {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl ClientSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSettings {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_max_per_tick")]
    pub max_per_tick: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            max_per_tick: default_max_per_tick(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_exponential_base")]
    pub exponential_base: f64,
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            exponential_base: default_exponential_base(),
            jitter: default_jitter(),
        }
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            exponential_base: self.exponential_base,
            jitter: self.jitter,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySettings {
    #[serde(default = "default_max_records")]
    pub max_records: usize,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            max_records: default_max_records(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorSettings {
    /// Interpreter the standalone host runs code with.
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    #[serde(default = "default_execution_timeout_ms")]
    pub default_timeout_ms: u64,
    #[serde(default = "default_max_output")]
    pub max_output: usize,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            default_timeout_ms: default_execution_timeout_ms(),
            max_output: default_max_output(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub client: ClientSettings,

    #[serde(default)]
    pub dispatch: DispatchSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub history: HistorySettings,

    #[serde(default)]
    pub executor: ExecutorSettings,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            server: ServerSettings::default(),
            client: ClientSettings::default(),
            dispatch: DispatchSettings::default(),
            retry: RetrySettings::default(),
            history: HistorySettings::default(),
            executor: ExecutorSettings::default(),
        }
    }
}

// ============================================
// DEFAULT FUNCTIONS
// ============================================

fn default_version() -> u32 {
    CONFIG_VERSION
}
fn default_host() -> String {
    DEFAULT_HOST.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_read_timeout_ms() -> u64 {
    10_000
}
fn default_tick_interval_ms() -> u64 {
    100
}
fn default_max_per_tick() -> usize {
    10
}
fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    10_000
}
fn default_exponential_base() -> f64 {
    2.0
}
fn default_jitter() -> bool {
    true
}
fn default_max_records() -> usize {
    DEFAULT_MAX_RECORDS
}
fn default_interpreter() -> String {
    "python3".to_string()
}
fn default_execution_timeout_ms() -> u64 {
    5_000
}
fn default_max_output() -> usize {
    MAX_OUTPUT_SIZE
}

// ============================================
// IMPLEMENTATION
// ============================================

/// `{platform config dir}/aether`.
///
/// # Errors
///
/// Returns [`ConfigError::DirectoryNotFound`] when the platform has no
/// config directory (e.g. `$HOME` unset).
pub fn default_config_dir() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join(CONFIG_DIR_NAME))
        .ok_or_else(|| ConfigError::DirectoryNotFound {
            location: ErrorLocation::from(Location::caller()),
        })
}

impl BridgeConfig {
    /// Load config from {config_dir}/bridge.json.
    ///
    /// # Returns
    ///
    /// Returns `Ok(BridgeConfig)` if loaded successfully or defaults if file missing.
    /// Returns `Err(ConfigError)` if file exists but is corrupted/invalid.
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            info!(
                "Config file not found at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path).map_err(|e| {
            warn!("Failed to read config file: {e}");
            ConfigError::ReadError {
                location: ErrorLocation::from(Location::caller()),
                path: config_path.clone(),
                source: e,
            }
        })?;

        let config: BridgeConfig = serde_json::from_str(&contents).map_err(|e| {
            warn!("Failed to parse config JSON: {e}");
            ConfigError::ParseError {
                location: ErrorLocation::from(Location::caller()),
                path: config_path.clone(),
                reason: e.to_string(),
            }
        })?;

        config.validate()?;

        info!("Config loaded from {}", config_path.display());
        Ok(config)
    }

    /// [`load`](Self::load), then apply `.env` and environment overrides and
    /// validate the result.
    pub fn load_with_env(config_dir: &Path) -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                warn!("Failed to load .env file: {e}");
            }
        }

        let mut config = Self::load(config_dir)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `AETHER_BRIDGE_HOST` / `AETHER_BRIDGE_PORT` when set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EnvironmentError`] if the port is not a `u16`.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(host) = std::env::var(ENV_HOST) {
            debug!("Overriding server host from {ENV_HOST}: {host}");
            self.server.host = host;
        }

        if let Ok(port) = std::env::var(ENV_PORT) {
            self.server.port =
                port.trim()
                    .parse::<u16>()
                    .map_err(|e| ConfigError::EnvironmentError {
                        location: ErrorLocation::from(Location::caller()),
                        variable: ENV_PORT,
                        value: port.clone(),
                        reason: e.to_string(),
                    })?;
            debug!("Overriding server port from {ENV_PORT}: {}", self.server.port);
        }

        Ok(())
    }

    /// Save config to {config_dir}/bridge.json using atomic write.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if:
    /// - Validation fails
    /// - Directory creation fails
    /// - Serialization fails
    /// - Write or rename fails
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        self.validate()?;

        std::fs::create_dir_all(config_dir).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: config_dir.to_path_buf(),
            source: e,
        })?;

        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let temp_path = config_dir.join(format!("{CONFIG_FILE_NAME}.tmp"));

        let json = serde_json::to_string_pretty(self).map_err(|e| ConfigError::SerializeError {
            location: ErrorLocation::from(Location::caller()),
            reason: e.to_string(),
        })?;

        std::fs::write(&temp_path, json).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: temp_path.clone(),
            source: e,
        })?;

        std::fs::rename(&temp_path, &config_path).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: config_path.clone(),
            source: e,
        })?;

        info!("Config saved to {}", config_path.display());
        Ok(())
    }

    /// Validate config values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the first invalid value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version == 0 || self.version > CONFIG_VERSION {
            return Err(invalid(format!(
                "Invalid version: {} (expected 1-{CONFIG_VERSION})",
                self.version
            )));
        }

        if self.server.host.trim().is_empty() {
            return Err(invalid("server.host cannot be empty".to_string()));
        }
        if self.server.port == 0 {
            return Err(invalid("server.port cannot be 0".to_string()));
        }

        if self.client.connect_timeout_ms == 0 || self.client.read_timeout_ms == 0 {
            return Err(invalid("client timeouts must be greater than 0".to_string()));
        }

        if self.dispatch.tick_interval_ms == 0 {
            return Err(invalid(
                "dispatch.tick_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.dispatch.max_per_tick == 0 {
            return Err(invalid(
                "dispatch.max_per_tick must be greater than 0".to_string(),
            ));
        }

        let retry = &self.retry;
        if retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts must be at least 1".to_string()));
        }
        if retry.initial_delay_ms == 0 || retry.max_delay_ms == 0 {
            return Err(invalid("retry delays must be greater than 0".to_string()));
        }
        if retry.initial_delay_ms > retry.max_delay_ms {
            return Err(invalid(format!(
                "retry.initial_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                retry.initial_delay_ms, retry.max_delay_ms
            )));
        }
        if !retry.exponential_base.is_finite() || retry.exponential_base < 1.0 {
            return Err(invalid(format!(
                "Invalid retry.exponential_base: {} (must be >= 1.0)",
                retry.exponential_base
            )));
        }

        if self.history.max_records == 0 {
            return Err(invalid(
                "history.max_records must be greater than 0".to_string(),
            ));
        }

        if self.executor.interpreter.trim().is_empty() {
            return Err(invalid("executor.interpreter cannot be empty".to_string()));
        }
        if self.executor.default_timeout_ms == 0 || self.executor.max_output == 0 {
            return Err(invalid(
                "executor timeout and output cap must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            tick_interval: Duration::from_millis(self.dispatch.tick_interval_ms),
            max_per_tick: self.dispatch.max_per_tick,
            max_output: self.executor.max_output,
        }
    }
}

#[track_caller]
fn invalid(reason: String) -> ConfigError {
    ConfigError::ValidationError {
        location: ErrorLocation::from(Location::caller()),
        reason,
    }
}
