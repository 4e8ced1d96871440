//! # suptank-client
//!
//! Client library for the suptank supervisory server.
//!
//! This crate provides:
//! - Async TCP connection with per-request timeouts
//! - Login, plant reads and actuator commands
//! - Raw opcode access for protocol testing

pub mod client;
pub mod connection;
pub mod error;

pub use client::{Client, LoginStatus};
pub use connection::{Connection, ConnectionConfig};
pub use error::ClientError;
