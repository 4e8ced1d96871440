//! High-level client API.

use crate::connection::{Connection, ConnectionConfig};
use crate::error::ClientError;
use std::net::SocketAddr;
use std::time::Duration;
use suptank_protocol::{Encoder, Opcode, PlantSnapshot};

/// Privilege granted by a successful login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStatus {
    /// Read-only user.
    User,
    /// May drive valves and the pump.
    Admin,
}

/// High-level client for suptank.
#[derive(Debug)]
pub struct Client {
    conn: Connection,
}

impl Client {
    /// Connects with default timeouts.
    pub async fn connect(addr: SocketAddr) -> Result<Self, ClientError> {
        Self::with_config(ConnectionConfig::new(addr)).await
    }

    /// Connects with the given configuration.
    pub async fn with_config(config: ConnectionConfig) -> Result<Self, ClientError> {
        Ok(Self {
            conn: Connection::connect(config).await?,
        })
    }

    /// Returns the underlying connection.
    pub fn connection(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Authenticates. The server closes the connection after a rejection.
    pub async fn login(&mut self, login: &str, password: &str) -> Result<LoginStatus, ClientError> {
        let request = Encoder::login(login, password)?;
        self.conn.send(&request).await?;
        let reply = self.conn.read_opcode().await?;
        match Opcode::from_code(reply) {
            Some(Opcode::AdminOk) => Ok(LoginStatus::Admin),
            Some(Opcode::Ok) => Ok(LoginStatus::User),
            Some(Opcode::Error) => Err(ClientError::Rejected),
            _ => Err(ClientError::UnexpectedReply(reply)),
        }
    }

    /// Reads the current plant state.
    pub async fn get_data(&mut self) -> Result<PlantSnapshot, ClientError> {
        self.conn.send(&Encoder::opcode(Opcode::GetData)).await?;
        self.expect_ok().await?;
        self.conn.read_snapshot().await
    }

    /// Opens or closes valve 1.
    pub async fn set_v1(&mut self, open: bool) -> Result<(), ClientError> {
        self.command(Opcode::SetV1, i16::from(open)).await
    }

    /// Opens or closes valve 2.
    pub async fn set_v2(&mut self, open: bool) -> Result<(), ClientError> {
        self.command(Opcode::SetV2, i16::from(open)).await
    }

    /// Sets the pump input.
    pub async fn set_pump(&mut self, input: u16) -> Result<(), ClientError> {
        // Sent as the raw 16 bits
        self.command(Opcode::SetPump, input as i16).await
    }

    /// Logs out. The server closes the connection after replying.
    pub async fn logout(&mut self) -> Result<(), ClientError> {
        self.conn.send(&Encoder::opcode(Opcode::Logout)).await?;
        self.expect_ok().await
    }

    /// Sends a bare opcode and returns the reply opcode.
    pub async fn send_raw(&mut self, code: i16) -> Result<i16, ClientError> {
        self.conn.send(&Encoder::raw_opcode(code)).await?;
        self.conn.read_opcode().await
    }

    /// Waits for the server to close the connection.
    pub async fn wait_closed(&mut self, timeout: Duration) -> bool {
        self.conn.wait_closed(timeout).await
    }

    /// Closes the connection.
    pub async fn close(self) {
        self.conn.close().await;
    }

    async fn command(&mut self, op: Opcode, arg: i16) -> Result<(), ClientError> {
        self.conn.send(&Encoder::command_with_arg(op, arg)).await?;
        self.expect_ok().await
    }

    async fn expect_ok(&mut self) -> Result<(), ClientError> {
        let reply = self.conn.read_opcode().await?;
        match Opcode::from_code(reply) {
            Some(Opcode::Ok) => Ok(()),
            Some(Opcode::Error) => Err(ClientError::Rejected),
            _ => Err(ClientError::UnexpectedReply(reply)),
        }
    }
}
