//! User directory.
//!
//! An ordered list of user records. Logins are unique; each user owns at
//! most one live [`Session`]. A user without a session is logged out but
//! stays in the directory.

use crate::auth::Credential;
use crate::session::Session;
use thiserror::Error;

/// Minimum length of logins and passwords, in characters.
pub const MIN_FIELD_LEN: usize = 6;

/// Maximum length of logins and passwords, in characters.
pub const MAX_FIELD_LEN: usize = 12;

/// Directory errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("login must be {} to {} characters", MIN_FIELD_LEN, MAX_FIELD_LEN)]
    InvalidLogin,

    #[error("password must be {} to {} characters", MIN_FIELD_LEN, MAX_FIELD_LEN)]
    InvalidPassword,

    #[error("password hash must be 64 hex characters")]
    InvalidPasswordHash,

    #[error("user already exists: {0}")]
    DuplicateLogin(String),

    #[error("user not found: {0}")]
    NotFound(String),
}

fn valid_field(value: &str) -> bool {
    (MIN_FIELD_LEN..=MAX_FIELD_LEN).contains(&value.chars().count())
}

/// A user record.
#[derive(Debug)]
pub struct User {
    login: String,
    credential: Credential,
    is_admin: bool,
    session: Option<Session>,
}

impl User {
    pub fn login(&self) -> &str {
        &self.login
    }

    pub fn is_admin(&self) -> bool {
        self.is_admin
    }

    /// Returns whether the user has a live session.
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Splits the record into login, admin flag and live session.
    pub fn parts_mut(&mut self) -> Option<(&str, bool, &mut Session)> {
        let session = self.session.as_mut()?;
        Some((&self.login, self.is_admin, session))
    }

    /// Checks a candidate password.
    pub fn verify_password(&self, candidate: &str) -> bool {
        self.credential.verify(candidate)
    }

    /// Detaches the live session, if any.
    pub fn take_session(&mut self) -> Option<Session> {
        self.session.take()
    }

    /// Binds a session, returning the one it replaces.
    pub fn bind(&mut self, session: Session) -> Option<Session> {
        self.session.replace(session)
    }

    /// Closes the live session, if any.
    pub async fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
        }
    }
}

/// Ordered collection of users.
#[derive(Debug, Default)]
pub struct UserDirectory {
    users: Vec<User>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a user with a plaintext password.
    pub fn add(&mut self, login: &str, password: &str, is_admin: bool) -> Result<(), DirectoryError> {
        if !valid_field(password) {
            return Err(DirectoryError::InvalidPassword);
        }
        self.insert(login, Credential::Plain(password.to_string()), is_admin)
    }

    /// Adds a user with a SHA-256 hex digest of its password.
    pub fn add_hashed(
        &mut self,
        login: &str,
        password_sha256: &str,
        is_admin: bool,
    ) -> Result<(), DirectoryError> {
        let credential =
            Credential::from_sha256_hex(password_sha256).ok_or(DirectoryError::InvalidPasswordHash)?;
        self.insert(login, credential, is_admin)
    }

    fn insert(
        &mut self,
        login: &str,
        credential: Credential,
        is_admin: bool,
    ) -> Result<(), DirectoryError> {
        if !valid_field(login) {
            return Err(DirectoryError::InvalidLogin);
        }
        if self.contains(login) {
            return Err(DirectoryError::DuplicateLogin(login.to_string()));
        }
        self.users.push(User {
            login: login.to_string(),
            credential,
            is_admin,
            session: None,
        });
        Ok(())
    }

    /// Removes a user and returns its record, session included.
    pub fn remove(&mut self, login: &str) -> Result<User, DirectoryError> {
        let index = self
            .users
            .iter()
            .position(|u| u.login == login)
            .ok_or_else(|| DirectoryError::NotFound(login.to_string()))?;
        Ok(self.users.remove(index))
    }

    pub fn get(&self, login: &str) -> Option<&User> {
        self.users.iter().find(|u| u.login == login)
    }

    pub fn get_mut(&mut self, login: &str) -> Option<&mut User> {
        self.users.iter_mut().find(|u| u.login == login)
    }

    pub fn contains(&self, login: &str) -> bool {
        self.get(login).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &User> {
        self.users.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut User> {
        self.users.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Number of users with a live session.
    pub fn connected_count(&self) -> usize {
        self.users.iter().filter(|u| u.is_connected()).count()
    }

    /// Lists every user in insertion order.
    pub fn summaries(&self) -> Vec<UserSummary> {
        self.users
            .iter()
            .map(|u| UserSummary {
                login: u.login.clone(),
                is_admin: u.is_admin,
                connected: u.is_connected(),
            })
            .collect()
    }

    /// Closes every live session.
    pub async fn close_all(&mut self) {
        for user in &mut self.users {
            user.disconnect().await;
        }
    }
}

/// Public view of a user record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSummary {
    pub login: String,
    pub is_admin: bool,
    pub connected: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Connection;
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};

    async fn test_session() -> (Session, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap())
            .await
            .unwrap();
        let (stream, peer) = listener.accept().await.unwrap();
        (Session::new(Connection::new(stream, peer)), client)
    }

    #[test]
    fn test_add_and_lookup() {
        let mut dir = UserDirectory::new();
        dir.add("alice1", "secret1", true).unwrap();
        dir.add("bob001", "secret2", false).unwrap();

        assert_eq!(dir.len(), 2);
        let alice = dir.get("alice1").unwrap();
        assert!(alice.is_admin());
        assert!(!alice.is_connected());
        assert!(alice.verify_password("secret1"));
        assert!(!alice.verify_password("secret2"));
        assert!(dir.get("carol1").is_none());
    }

    #[test]
    fn test_field_lengths() {
        let mut dir = UserDirectory::new();
        assert_eq!(dir.add("short", "secret1", false), Err(DirectoryError::InvalidLogin));
        assert_eq!(
            dir.add("waytoolonglogin", "secret1", false),
            Err(DirectoryError::InvalidLogin)
        );
        assert_eq!(dir.add("alice1", "pw", false), Err(DirectoryError::InvalidPassword));
        assert_eq!(
            dir.add("alice1", "passwordtoolong", false),
            Err(DirectoryError::InvalidPassword)
        );
        // Bounds are inclusive and counted in characters
        dir.add("abcdef", "123456789012", false).unwrap();
        dir.add("ééééééé", "ünïcödé", false).unwrap();
        assert_eq!(dir.len(), 2);
    }

    #[test]
    fn test_duplicate_login() {
        let mut dir = UserDirectory::new();
        dir.add("alice1", "secret1", true).unwrap();
        assert_eq!(
            dir.add("alice1", "another", false),
            Err(DirectoryError::DuplicateLogin("alice1".to_string()))
        );
        assert_eq!(dir.len(), 1);
        assert!(dir.get("alice1").unwrap().is_admin());
    }

    #[test]
    fn test_add_hashed() {
        let mut dir = UserDirectory::new();
        let digest = Credential::hash_password("hunter22");
        dir.add_hashed("carol1", &digest, false).unwrap();
        assert!(dir.get("carol1").unwrap().verify_password("hunter22"));

        assert_eq!(
            dir.add_hashed("dave01", "nothex", false),
            Err(DirectoryError::InvalidPasswordHash)
        );
    }

    #[test]
    fn test_remove() {
        let mut dir = UserDirectory::new();
        dir.add("alice1", "secret1", true).unwrap();
        dir.add("bob001", "secret2", false).unwrap();

        let removed = dir.remove("alice1").unwrap();
        assert_eq!(removed.login(), "alice1");
        assert!(!dir.contains("alice1"));
        assert_eq!(
            dir.remove("alice1").unwrap_err(),
            DirectoryError::NotFound("alice1".to_string())
        );
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn test_summaries_keep_order() {
        let mut dir = UserDirectory::new();
        dir.add("zed001", "secret1", false).unwrap();
        dir.add("alice1", "secret1", true).unwrap();

        let logins: Vec<_> = dir.summaries().into_iter().map(|s| s.login).collect();
        assert_eq!(logins, vec!["zed001", "alice1"]);
    }

    #[tokio::test]
    async fn test_bind_returns_previous() {
        let mut dir = UserDirectory::new();
        dir.add("alice1", "secret1", true).unwrap();
        let (first, _c1) = test_session().await;
        let (second, _c2) = test_session().await;
        let first_id = first.id();
        let second_id = second.id();

        let user = dir.get_mut("alice1").unwrap();
        assert!(user.bind(first).is_none());
        let previous = user.bind(second).unwrap();
        assert_eq!(previous.id(), first_id);
        assert_eq!(user.session().unwrap().id(), second_id);
        assert_eq!(dir.connected_count(), 1);
    }

    #[tokio::test]
    async fn test_close_all() {
        let mut dir = UserDirectory::new();
        dir.add("alice1", "secret1", true).unwrap();
        dir.add("bob001", "secret2", false).unwrap();
        let (session, mut client) = test_session().await;
        dir.get_mut("bob001").unwrap().bind(session);

        dir.close_all().await;
        assert_eq!(dir.connected_count(), 0);
        assert_eq!(dir.len(), 2);

        let mut buf = Vec::new();
        client.read_to_end(&mut buf).await.unwrap();
        assert!(buf.is_empty());
    }
}
