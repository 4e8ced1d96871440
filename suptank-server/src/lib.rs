//! # suptank-server
//!
//! TCP server for the suptank supervisory plant.
//!
//! This crate provides:
//! - A single-task dispatcher multiplexing the listener and every session
//!   over one readiness wait
//! - The inline login handshake and user directory
//! - The command table (plant reads and privileged actuator writes)
//! - Start/stop lifecycle control
//! - YAML and environment configuration

pub mod auth;
pub mod config;
pub mod directory;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod login;
pub mod plant;
pub mod readiness;
pub mod server;
pub mod session;
pub mod transport;

pub use auth::Credential;
pub use config::{Config, ConfigError, NetworkConfig, PlantConfig, UserEntry};
pub use directory::{DirectoryError, User, UserDirectory, UserSummary};
pub use dispatcher::{DispatchExit, Dispatcher, Step};
pub use error::{FatalError, ServerError};
pub use handler::{CommandHandler, Disposition};
pub use plant::PlantAdapter;
pub use server::{Server, ServerConfig, ServerStats};
pub use session::Session;
pub use transport::{Connection, TransportError};

/// Directory shared between the dispatcher and the lifecycle controller.
pub type SharedDirectory = std::sync::Arc<tokio::sync::Mutex<UserDirectory>>;
