//! Per-connection transport.
//!
//! Every read and write takes a timeout; results are reported as
//! [`TransportError`] statuses rather than raw I/O errors so the dispatcher
//! can tell a vanished peer from a slow one.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use suptank_protocol::{decode_string_body, string_len, Opcode, ProtocolError};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Outcome of a failed transport operation.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("peer disconnected")]
    Disconnected,

    #[error("operation timed out")]
    Timeout,

    #[error("I/O error: {0}")]
    Io(#[source] io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl TransportError {
    /// Classifies an I/O error.
    pub fn from_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => TransportError::Disconnected,
            io::ErrorKind::TimedOut => TransportError::Timeout,
            _ => TransportError::Io(err),
        }
    }

    /// Returns whether the peer is gone.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, TransportError::Disconnected)
    }
}

/// A client connection.
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
}

impl Connection {
    /// Wraps an accepted stream.
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        let _ = stream.set_nodelay(true);
        Self { stream, peer }
    }

    /// Returns the remote address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub(crate) fn stream(&self) -> &TcpStream {
        &self.stream
    }

    /// Reads an opcode from a socket that reported readiness.
    ///
    /// The first attempt does not wait. `Ok(None)` means the readiness was
    /// stale and nothing was pending. If only part of the opcode has
    /// arrived, the rest is awaited for at most `timeout`.
    pub async fn read_ready_opcode(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<i16>, TransportError> {
        let mut buf = [0u8; 2];
        match self.stream.try_read(&mut buf) {
            Ok(0) => Err(TransportError::Disconnected),
            Ok(2) => Ok(Some(i16::from_be_bytes(buf))),
            Ok(_) => {
                self.read_exact_within(&mut buf[1..], timeout).await?;
                Ok(Some(i16::from_be_bytes(buf)))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(TransportError::from_io(e)),
        }
    }

    /// Reads a big-endian i16.
    pub async fn read_i16(&mut self, timeout: Duration) -> Result<i16, TransportError> {
        let mut buf = [0u8; 2];
        self.read_exact_within(&mut buf, timeout).await?;
        Ok(i16::from_be_bytes(buf))
    }

    /// Reads a length-prefixed string. `timeout` bounds the whole string.
    pub async fn read_string(&mut self, timeout: Duration) -> Result<String, TransportError> {
        let read = async {
            let prefix = self.stream.read_u16().await.map_err(TransportError::from_io)?;
            let len = string_len(prefix)?;
            let mut body = vec![0u8; len];
            self.stream
                .read_exact(&mut body)
                .await
                .map_err(TransportError::from_io)?;
            Ok::<String, TransportError>(decode_string_body(body)?)
        };
        match tokio::time::timeout(timeout, read).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        }
    }

    /// Writes a big-endian i16.
    pub async fn write_i16(&mut self, value: i16, timeout: Duration) -> Result<(), TransportError> {
        self.write_bytes(&value.to_be_bytes(), timeout).await
    }

    /// Writes a single opcode.
    pub async fn write_opcode(
        &mut self,
        op: Opcode,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        self.write_i16(op.code(), timeout).await
    }

    /// Writes a raw byte buffer.
    pub async fn write_bytes(&mut self, data: &[u8], timeout: Duration) -> Result<(), TransportError> {
        match tokio::time::timeout(timeout, self.stream.write_all(data)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(TransportError::from_io(e)),
            Err(_) => Err(TransportError::Timeout),
        }
    }

    /// Shuts down the write side and drops the socket.
    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            tracing::debug!("[{}] Shutdown error: {}", self.peer, e);
        }
    }

    async fn read_exact_within(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<(), TransportError> {
        match tokio::time::timeout(timeout, self.stream.read_exact(buf)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(TransportError::from_io(e)),
            Err(_) => Err(TransportError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn pair() -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, peer) = listener.accept().await.unwrap();
        (Connection::new(server, peer), client)
    }

    const TIMEOUT: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn test_read_i16() {
        let (mut conn, mut client) = pair().await;
        client.write_all(&(-1234i16).to_be_bytes()).await.unwrap();
        assert_eq!(conn.read_i16(TIMEOUT).await.unwrap(), -1234);
    }

    #[tokio::test]
    async fn test_read_string() {
        let (mut conn, mut client) = pair().await;
        client.write_all(&[0, 6]).await.unwrap();
        client.write_all(b"alice1").await.unwrap();
        assert_eq!(conn.read_string(TIMEOUT).await.unwrap(), "alice1");
    }

    #[tokio::test]
    async fn test_read_string_too_long() {
        let (mut conn, mut client) = pair().await;
        client.write_all(&[0xFF, 0xFF]).await.unwrap();
        let result = conn.read_string(TIMEOUT).await;
        assert!(matches!(
            result,
            Err(TransportError::Protocol(ProtocolError::StringTooLong { .. }))
        ));
    }

    #[tokio::test]
    async fn test_read_timeout() {
        let (mut conn, _client) = pair().await;
        let result = conn.read_i16(Duration::from_millis(20)).await;
        assert!(matches!(result, Err(TransportError::Timeout)));
    }

    #[tokio::test]
    async fn test_read_disconnected() {
        let (mut conn, client) = pair().await;
        drop(client);
        let result = conn.read_i16(TIMEOUT).await;
        assert!(matches!(result, Err(TransportError::Disconnected)));
    }

    #[tokio::test]
    async fn test_ready_opcode_stale_readiness() {
        let (mut conn, _client) = pair().await;
        // Nothing was sent, so the non-blocking attempt finds nothing
        assert!(conn.read_ready_opcode(TIMEOUT).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ready_opcode_split() {
        let (mut conn, mut client) = pair().await;
        let bytes = Opcode::GetData.code().to_be_bytes();
        client.write_all(&bytes[..1]).await.unwrap();
        conn.stream().readable().await.unwrap();

        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            client.write_all(&bytes[1..]).await.unwrap();
            client
        });

        let code = conn.read_ready_opcode(TIMEOUT).await.unwrap();
        assert_eq!(code, Some(Opcode::GetData.code()));
        let _client = writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_ready_opcode_eof() {
        let (mut conn, client) = pair().await;
        drop(client);
        conn.stream().readable().await.unwrap();
        let result = conn.read_ready_opcode(TIMEOUT).await;
        assert!(matches!(result, Err(TransportError::Disconnected)));
    }

    #[tokio::test]
    async fn test_write_and_close() {
        let (mut conn, mut client) = pair().await;
        conn.write_opcode(Opcode::Ok, TIMEOUT).await.unwrap();
        conn.close().await;

        let mut buf = Vec::new();
        client.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, Opcode::Ok.code().to_be_bytes());
    }

    #[test]
    fn test_error_classification() {
        let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        assert!(TransportError::from_io(eof).is_disconnect());

        let reset = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        assert!(TransportError::from_io(reset).is_disconnect());

        let other = io::Error::new(io::ErrorKind::Other, "other");
        assert!(matches!(TransportError::from_io(other), TransportError::Io(_)));
    }
}
