//! Server error types.

use crate::config::ConfigError;
use crate::directory::DirectoryError;
use std::net::SocketAddr;
use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to listen on {addr}: {source}")]
    Listen {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to launch dispatcher: {0}")]
    Launch(String),

    #[error("directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Conditions that end the dispatcher loop.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("listening socket is no longer accepting")]
    ListenerClosed,

    #[error("readiness wait failed: {0}")]
    Wait(#[source] std::io::Error),
}
