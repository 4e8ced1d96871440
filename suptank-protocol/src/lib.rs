//! # suptank-protocol
//!
//! Wire protocol for the suptank supervisory server.
//!
//! This crate provides:
//! - 16-bit command and response opcodes
//! - Length-prefixed string encoding
//! - The fixed-size plant snapshot record returned by `GET_DATA`
//! - Request/response encoders shared by server and client
//!
//! All integers travel in network byte order (big-endian).

pub mod codec;
pub mod error;
pub mod opcode;
pub mod snapshot;

pub use codec::{decode_string_body, encode_string, string_len, Encoder};
pub use error::ProtocolError;
pub use opcode::Opcode;
pub use snapshot::{PlantSnapshot, SNAPSHOT_SIZE};

/// Default TCP port of the supervisory server.
pub const DEFAULT_PORT: u16 = 23456;

/// Maximum accepted length of a length-prefixed string, in bytes.
pub const MAX_STRING_LEN: usize = 1024;
