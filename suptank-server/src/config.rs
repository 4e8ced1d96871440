//! Server configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via SUPTANK_CONFIG)
//! 3. Environment variables

use crate::directory::{DirectoryError, UserDirectory};
use crate::server::ServerConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use suptank_plant::SimulatorParams;
use suptank_protocol::DEFAULT_PORT;

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network configuration.
    pub network: NetworkConfig,
    /// Plant configuration.
    pub plant: PlantConfig,
    /// Users seeded into the directory at startup.
    pub users: Vec<UserEntry>,
    /// Optional path to a users file of `login:password:admin` lines.
    pub users_file: Option<PathBuf>,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("SUPTANK_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();

        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.network.apply_env_overrides();
        self.plant.apply_env_overrides();

        if let Ok(path) = std::env::var("SUPTANK_USERS_FILE") {
            self.users_file = Some(PathBuf::from(path));
        }
    }

    /// Appends the entries of the users file, if configured.
    pub fn load_users_file(&mut self) -> Result<(), ConfigError> {
        let Some(ref path) = self.users_file else {
            return Ok(());
        };
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(path.clone(), e))?;

        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            // Skip empty lines and comments
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let entry = UserEntry::parse_line(line).ok_or_else(|| {
                ConfigError::ParseError(
                    path.clone(),
                    format!("line {}: expected login:password[:admin]", index + 1),
                )
            })?;
            self.users.push(entry);
        }
        Ok(())
    }

    /// Checks values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.wait_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "network.wait_timeout_secs must be greater than zero".to_string(),
            ));
        }
        for entry in &self.users {
            entry.validate()?;
        }
        Ok(())
    }

    /// Builds the initial user directory from the configured users.
    pub fn directory(&self) -> Result<UserDirectory, DirectoryError> {
        let mut directory = UserDirectory::new();
        for entry in &self.users {
            match (&entry.password, &entry.password_sha256) {
                (_, Some(digest)) => directory.add_hashed(&entry.login, digest, entry.admin)?,
                (Some(password), None) => directory.add(&entry.login, password, entry.admin)?,
                (None, None) => return Err(DirectoryError::InvalidPassword),
            }
        }
        Ok(directory)
    }

    /// Returns the runtime server settings.
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind_addr: self.network.bind_addr,
            wait_timeout: self.network.wait_timeout(),
            opcode_timeout: Duration::from_millis(self.network.opcode_timeout_ms),
            payload_timeout: Duration::from_millis(self.network.payload_timeout_ms),
            login_timeout: Duration::from_millis(self.network.login_timeout_ms),
            plant_tick: self.plant.tick(),
        }
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind to.
    #[serde(with = "socket_addr_serde")]
    pub bind_addr: SocketAddr,
    /// Readiness wait timeout in seconds.
    pub wait_timeout_secs: u64,
    /// Timeout for completing a partially received opcode, in milliseconds.
    pub opcode_timeout_ms: u64,
    /// Timeout for command payloads and responses, in milliseconds.
    pub payload_timeout_ms: u64,
    /// Timeout for each login handshake read, in milliseconds.
    pub login_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            wait_timeout_secs: 10,
            opcode_timeout_ms: 50,
            payload_timeout_ms: 1000,
            login_timeout_ms: 2000,
        }
    }
}

impl NetworkConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("SUPTANK_BIND") {
            if let Ok(parsed) = addr.parse() {
                self.bind_addr = parsed;
            }
        }

        if let Ok(timeout) = std::env::var("SUPTANK_WAIT_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                self.wait_timeout_secs = secs;
            }
        }

        if let Ok(timeout) = std::env::var("SUPTANK_OPCODE_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse() {
                self.opcode_timeout_ms = ms;
            }
        }

        if let Ok(timeout) = std::env::var("SUPTANK_PAYLOAD_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse() {
                self.payload_timeout_ms = ms;
            }
        }

        if let Ok(timeout) = std::env::var("SUPTANK_LOGIN_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse() {
                self.login_timeout_ms = ms;
            }
        }
    }

    /// Returns the readiness wait timeout as Duration.
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }
}

/// Plant configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlantConfig {
    /// Simulation tick in milliseconds (0 = no ticking).
    pub tick_ms: u64,
    /// Simulator coefficients.
    pub simulator: SimulatorParams,
}

impl Default for PlantConfig {
    fn default() -> Self {
        Self {
            tick_ms: 100,
            simulator: SimulatorParams::default(),
        }
    }
}

impl PlantConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(tick) = std::env::var("SUPTANK_PLANT_TICK_MS") {
            if let Ok(ms) = tick.parse() {
                self.tick_ms = ms;
            }
        }
    }

    /// Returns the tick as Duration.
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

/// A user to seed into the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    pub login: String,
    /// Plaintext password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// SHA-256 hex digest of the password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_sha256: Option<String>,
    #[serde(default)]
    pub admin: bool,
}

impl UserEntry {
    /// Parses a `login:password[:admin]` line.
    fn parse_line(line: &str) -> Option<Self> {
        let mut fields = line.splitn(3, ':');
        let login = fields.next()?.trim();
        let password = fields.next()?.trim();
        let admin = match fields.next().map(|f| f.trim().to_lowercase()) {
            None => false,
            Some(flag) => match flag.as_str() {
                "1" | "true" | "admin" | "yes" => true,
                "0" | "false" | "user" | "no" | "" => false,
                _ => return None,
            },
        };
        if login.is_empty() || password.is_empty() {
            return None;
        }
        Some(Self {
            login: login.to_string(),
            password: Some(password.to_string()),
            password_sha256: None,
            admin,
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match (&self.password, &self.password_sha256) {
            (Some(_), Some(_)) => Err(ConfigError::ValidationError(format!(
                "user {}: set either password or password_sha256, not both",
                self.login
            ))),
            (None, None) => Err(ConfigError::ValidationError(format!(
                "user {}: no password configured",
                self.login
            ))),
            _ => Ok(()),
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Custom serde module for SocketAddr (to handle as string in YAML).
mod socket_addr_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::net::SocketAddr;

    pub fn serialize<S>(addr: &SocketAddr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&addr.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
