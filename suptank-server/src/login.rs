//! Login handshake.
//!
//! Runs on a freshly accepted socket inside the dispatcher iteration that
//! accepted it: `LOGIN`, login string, password string, then one reply.
//! Every read is bounded by the login timeout, so a slow client can stall
//! the loop for at most three of them. Nothing here is fatal to the loop.

use crate::directory::UserDirectory;
use crate::server::ServerStats;
use crate::session::Session;
use crate::transport::{Connection, TransportError};
use std::sync::atomic::Ordering;
use std::time::Duration;
use suptank_protocol::Opcode;
use thiserror::Error;

/// Why a connection was not admitted.
#[derive(Debug, Error)]
pub enum Rejection {
    #[error("expected LOGIN, got opcode {0}")]
    NotLogin(i16),

    #[error("unknown user {0:?}")]
    UnknownUser(String),

    #[error("wrong password for {0:?}")]
    WrongPassword(String),

    #[error("{0}")]
    Transport(#[from] TransportError),
}

/// Outcome of a handshake.
#[derive(Debug)]
pub enum Admission {
    Accepted { login: String, is_admin: bool },
    Rejected(Rejection),
}

impl Admission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Admission::Accepted { .. })
    }
}

/// Authenticates `conn` and binds it to its user.
///
/// A prior session of the same user is closed before the new one is bound.
pub async fn admit(
    directory: &mut UserDirectory,
    mut conn: Connection,
    timeout: Duration,
    stats: &ServerStats,
) -> Admission {
    let peer = conn.peer_addr();
    let (login, password) = match read_credentials(&mut conn, timeout).await {
        Ok(credentials) => credentials,
        Err(rejection) => return reject(conn, rejection, timeout, stats).await,
    };

    let user = match directory.get_mut(&login) {
        Some(user) => user,
        None => return reject(conn, Rejection::UnknownUser(login), timeout, stats).await,
    };
    if !user.verify_password(&password) {
        return reject(conn, Rejection::WrongPassword(login), timeout, stats).await;
    }

    let is_admin = user.is_admin();
    if let Some(previous) = user.take_session() {
        tracing::warn!(
            "[{}] {} logged in again, closing session {} from {}",
            peer,
            login,
            previous.id(),
            previous.remote_addr()
        );
        stats.sessions_superseded.fetch_add(1, Ordering::Relaxed);
        previous.close().await;
    }

    let reply = if is_admin { Opcode::AdminOk } else { Opcode::Ok };
    let mut session = Session::new(conn);
    if let Err(e) = session.connection_mut().write_opcode(reply, timeout).await {
        tracing::debug!("[{}] Failed to acknowledge login of {}: {}", peer, login, e);
        session.close().await;
        stats.logins_rejected.fetch_add(1, Ordering::Relaxed);
        return Admission::Rejected(Rejection::Transport(e));
    }

    tracing::info!(
        "[{}] {} logged in{} (session {})",
        peer,
        login,
        if is_admin { " as admin" } else { "" },
        session.id()
    );
    user.bind(session);
    stats.logins_accepted.fetch_add(1, Ordering::Relaxed);
    Admission::Accepted { login, is_admin }
}

async fn read_credentials(
    conn: &mut Connection,
    timeout: Duration,
) -> Result<(String, String), Rejection> {
    let code = conn.read_i16(timeout).await?;
    if code != Opcode::Login.code() {
        return Err(Rejection::NotLogin(code));
    }
    let login = conn.read_string(timeout).await?;
    let password = conn.read_string(timeout).await?;
    Ok((login, password))
}

async fn reject(
    mut conn: Connection,
    rejection: Rejection,
    timeout: Duration,
    stats: &ServerStats,
) -> Admission {
    tracing::warn!("[{}] Login rejected: {}", conn.peer_addr(), rejection);
    stats.logins_rejected.fetch_add(1, Ordering::Relaxed);

    let gone = matches!(rejection, Rejection::Transport(ref e) if e.is_disconnect());
    if !gone {
        // Best effort; the socket is closed either way
        let _ = conn.write_opcode(Opcode::Error, timeout).await;
    }
    conn.close().await;
    Admission::Rejected(rejection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use suptank_protocol::Encoder;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    const TIMEOUT: Duration = Duration::from_millis(300);

    fn test_directory() -> UserDirectory {
        let mut dir = UserDirectory::new();
        dir.add("alice1", "secret1", true).unwrap();
        dir.add("bob001", "secret2", false).unwrap();
        dir
    }

    async fn pair() -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap())
            .await
            .unwrap();
        let (stream, peer) = listener.accept().await.unwrap();
        (Connection::new(stream, peer), client)
    }

    async fn attempt(
        dir: &mut UserDirectory,
        stats: &ServerStats,
        login: &str,
        password: &str,
    ) -> (Admission, TcpStream) {
        let (conn, mut client) = pair().await;
        let request = Encoder::login(login, password).unwrap();
        client.write_all(&request).await.unwrap();
        (admit(dir, conn, TIMEOUT, stats).await, client)
    }

    async fn read_all(client: &mut TcpStream) -> Vec<u8> {
        let mut buf = Vec::new();
        client.read_to_end(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn test_admin_login() {
        let mut dir = test_directory();
        let stats = ServerStats::default();
        let (admission, mut client) = attempt(&mut dir, &stats, "alice1", "secret1").await;

        assert!(matches!(
            admission,
            Admission::Accepted { ref login, is_admin: true } if login == "alice1"
        ));
        assert_eq!(client.read_i16().await.unwrap(), Opcode::AdminOk.code());
        assert!(dir.get("alice1").unwrap().is_connected());
        assert_eq!(stats.logins_accepted.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_user_login() {
        let mut dir = test_directory();
        let stats = ServerStats::default();
        let (admission, mut client) = attempt(&mut dir, &stats, "bob001", "secret2").await;

        assert!(admission.is_accepted());
        assert_eq!(client.read_i16().await.unwrap(), Opcode::Ok.code());
    }

    #[tokio::test]
    async fn test_wrong_password() {
        let mut dir = test_directory();
        let stats = ServerStats::default();
        let (admission, mut client) = attempt(&mut dir, &stats, "alice1", "secret2").await;

        assert!(matches!(
            admission,
            Admission::Rejected(Rejection::WrongPassword(_))
        ));
        assert_eq!(read_all(&mut client).await, Opcode::Error.code().to_be_bytes());
        assert!(!dir.get("alice1").unwrap().is_connected());
        assert_eq!(stats.logins_rejected.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let mut dir = test_directory();
        let stats = ServerStats::default();
        let (admission, mut client) = attempt(&mut dir, &stats, "mallory", "secret1").await;

        assert!(matches!(
            admission,
            Admission::Rejected(Rejection::UnknownUser(_))
        ));
        assert_eq!(read_all(&mut client).await, Opcode::Error.code().to_be_bytes());
        assert_eq!(dir.connected_count(), 0);
    }

    #[tokio::test]
    async fn test_not_login_opcode() {
        let mut dir = test_directory();
        let stats = ServerStats::default();
        let (conn, mut client) = pair().await;
        client
            .write_all(&Encoder::opcode(Opcode::GetData))
            .await
            .unwrap();

        let admission = admit(&mut dir, conn, TIMEOUT, &stats).await;
        assert!(matches!(admission, Admission::Rejected(Rejection::NotLogin(_))));
        assert_eq!(read_all(&mut client).await, Opcode::Error.code().to_be_bytes());
    }

    #[tokio::test]
    async fn test_handshake_timeout() {
        let mut dir = test_directory();
        let stats = ServerStats::default();
        let (conn, mut client) = pair().await;
        client
            .write_all(&Opcode::Login.code().to_be_bytes())
            .await
            .unwrap();

        let admission = admit(&mut dir, conn, Duration::from_millis(50), &stats).await;
        assert!(matches!(
            admission,
            Admission::Rejected(Rejection::Transport(TransportError::Timeout))
        ));
        assert_eq!(read_all(&mut client).await, Opcode::Error.code().to_be_bytes());
    }

    #[tokio::test]
    async fn test_relogin_supersedes_and_closes() {
        let mut dir = test_directory();
        let stats = ServerStats::default();
        let (_, mut first) = attempt(&mut dir, &stats, "alice1", "secret1").await;
        assert_eq!(first.read_i16().await.unwrap(), Opcode::AdminOk.code());
        let first_id = dir.get("alice1").unwrap().session().unwrap().id();

        let (admission, mut second) = attempt(&mut dir, &stats, "alice1", "secret1").await;
        assert!(admission.is_accepted());
        assert_eq!(second.read_i16().await.unwrap(), Opcode::AdminOk.code());

        // The first connection was closed explicitly
        assert!(read_all(&mut first).await.is_empty());
        assert_ne!(dir.get("alice1").unwrap().session().unwrap().id(), first_id);
        assert_eq!(stats.sessions_superseded.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_failed_login_keeps_existing_session() {
        let mut dir = test_directory();
        let stats = ServerStats::default();
        let (_, mut first) = attempt(&mut dir, &stats, "alice1", "secret1").await;
        assert_eq!(first.read_i16().await.unwrap(), Opcode::AdminOk.code());
        let id = dir.get("alice1").unwrap().session().unwrap().id();

        let (admission, _second) = attempt(&mut dir, &stats, "alice1", "wrongpw").await;
        assert!(!admission.is_accepted());
        assert_eq!(dir.get("alice1").unwrap().session().unwrap().id(), id);
    }
}
