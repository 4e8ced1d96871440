//! Connection management.

use crate::error::ClientError;
use std::net::SocketAddr;
use std::time::Duration;
use suptank_protocol::{PlantSnapshot, SNAPSHOT_SIZE};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server address.
    pub addr: SocketAddr,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Timeout for one request/response exchange.
    pub request_timeout: Duration,
}

impl ConnectionConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// A connection to a suptank server.
#[derive(Debug)]
pub struct Connection {
    config: ConnectionConfig,
    stream: TcpStream,
}

impl Connection {
    /// Connects to the server.
    pub async fn connect(config: ConnectionConfig) -> Result<Self, ClientError> {
        tracing::debug!("Connecting to {}...", config.addr);

        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(config.addr))
            .await
            .map_err(|_| {
                tracing::debug!("Connection timeout");
                ClientError::Timeout
            })?
            .map_err(|e| {
                tracing::debug!("Connection failed: {}", e);
                ClientError::from(e)
            })?;

        stream.set_nodelay(true).ok();
        Ok(Self { config, stream })
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Returns the local address of the socket.
    pub fn local_addr(&self) -> Result<SocketAddr, ClientError> {
        Ok(self.stream.local_addr()?)
    }

    /// Writes a complete request.
    pub async fn send(&mut self, request: &[u8]) -> Result<(), ClientError> {
        let timeout = self.config.request_timeout;
        match tokio::time::timeout(timeout, self.stream.write_all(request)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ClientError::Timeout),
        }
    }

    /// Reads one reply opcode.
    pub async fn read_opcode(&mut self) -> Result<i16, ClientError> {
        let timeout = self.config.request_timeout;
        match tokio::time::timeout(timeout, self.stream.read_i16()).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ClientError::Timeout),
        }
    }

    /// Reads the snapshot record following an `OK` reply to `GET_DATA`.
    pub async fn read_snapshot(&mut self) -> Result<PlantSnapshot, ClientError> {
        let timeout = self.config.request_timeout;
        let mut record = [0u8; SNAPSHOT_SIZE];
        match tokio::time::timeout(timeout, self.stream.read_exact(&mut record)).await {
            Ok(result) => {
                result?;
            }
            Err(_) => return Err(ClientError::Timeout),
        }
        Ok(PlantSnapshot::decode(&record)?)
    }

    /// Waits for the server to close the connection.
    ///
    /// Returns `false` if data arrived instead or nothing happened within
    /// `timeout`.
    pub async fn wait_closed(&mut self, timeout: Duration) -> bool {
        let mut byte = [0u8; 1];
        match tokio::time::timeout(timeout, self.stream.read(&mut byte)).await {
            Ok(Ok(0)) => true,
            Ok(Ok(_)) => false,
            Ok(Err(e)) => ClientError::from(e).is_closed(),
            Err(_) => false,
        }
    }

    /// Shuts down the connection.
    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            tracing::debug!("Shutdown error: {}", e);
        }
    }
}
