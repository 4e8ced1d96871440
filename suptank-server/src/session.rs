//! Session management.
//!
//! A session binds an authenticated user to its live connection.

use crate::transport::Connection;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// An authenticated client session.
#[derive(Debug)]
pub struct Session {
    /// Unique session ID.
    id: Uuid,

    /// Live connection.
    conn: Connection,

    /// Login time.
    established_at: Instant,

    /// Commands handled on this session.
    command_count: u64,
}

impl Session {
    /// Creates a session for a freshly authenticated connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            id: Uuid::new_v4(),
            conn,
            established_at: Instant::now(),
            command_count: 0,
        }
    }

    /// Returns the session ID.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the remote address.
    pub fn remote_addr(&self) -> SocketAddr {
        self.conn.peer_addr()
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Records a handled command.
    pub fn record_command(&mut self) {
        self.command_count += 1;
    }

    pub fn command_count(&self) -> u64 {
        self.command_count
    }

    /// Returns the time since login.
    pub fn age(&self) -> Duration {
        self.established_at.elapsed()
    }

    /// Closes the underlying connection.
    pub async fn close(self) {
        tracing::debug!(
            "[{}] Closing session {} after {} command(s)",
            self.conn.peer_addr(),
            self.id,
            self.command_count
        );
        self.conn.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};

    async fn test_session() -> (Session, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap())
            .await
            .unwrap();
        let (stream, peer) = listener.accept().await.unwrap();
        (Session::new(Connection::new(stream, peer)), client)
    }

    #[tokio::test]
    async fn test_session_creation() {
        let (session, client) = test_session().await;
        assert_eq!(session.command_count(), 0);
        assert_eq!(session.remote_addr(), client.local_addr().unwrap());
    }

    #[tokio::test]
    async fn test_session_ids_unique() {
        let (a, _ca) = test_session().await;
        let (b, _cb) = test_session().await;
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn test_record_command() {
        let (mut session, _client) = test_session().await;
        session.record_command();
        session.record_command();
        assert_eq!(session.command_count(), 2);
    }
}
