//! Readiness queue.
//!
//! The queue is rebuilt from scratch every loop iteration: the listening
//! socket plus every live session, keyed by login. One call to
//! [`ReadinessQueue::wait`] blocks until at least one of them has pending
//! input or the timeout elapses.
//!
//! A ready listener is accepted while polling, so the accepted stream is
//! handed back inside [`Activity`] instead of being lost.

use crate::transport::Connection;
use std::collections::HashSet;
use std::future::poll_fn;
use std::io;
use std::net::SocketAddr;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

/// Result of waiting on the queue.
#[derive(Debug)]
pub enum WaitStatus {
    /// At least one socket has activity.
    Ready(Activity),
    /// Nothing happened within the timeout.
    Timeout,
    /// The readiness machinery itself failed.
    ///
    /// A failure on a single client socket is reported through
    /// [`Activity::had_error`] instead.
    Error(io::Error),
}

/// Sockets that reported activity during one wait.
#[derive(Debug, Default)]
pub struct Activity {
    clients: HashSet<String>,
    failed: HashSet<String>,
    accepted: Option<io::Result<(TcpStream, SocketAddr)>>,
}

impl Activity {
    /// Marks the socket registered under `key` as readable.
    pub fn mark_ready(&mut self, key: &str) {
        self.clients.insert(key.to_string());
    }

    /// Marks the socket registered under `key` as broken.
    pub fn mark_failed(&mut self, key: &str) {
        self.failed.insert(key.to_string());
    }

    /// Returns whether the socket registered under `key` had activity.
    pub fn had_activity(&self, key: &str) -> bool {
        self.clients.contains(key)
    }

    /// Returns whether polling the socket registered under `key` failed.
    pub fn had_error(&self, key: &str) -> bool {
        self.failed.contains(key)
    }

    /// Returns whether the listening socket had activity.
    pub fn listener_activity(&self) -> bool {
        self.accepted.is_some()
    }

    /// Takes the result of accepting on the listening socket.
    pub fn take_accepted(&mut self) -> Option<io::Result<(TcpStream, SocketAddr)>> {
        self.accepted.take()
    }

    fn is_empty(&self) -> bool {
        self.clients.is_empty() && self.failed.is_empty() && self.accepted.is_none()
    }
}

/// Set of sockets to wait on.
#[derive(Default)]
pub struct ReadinessQueue<'a> {
    listener: Option<&'a TcpListener>,
    sockets: Vec<(&'a str, &'a Connection)>,
}

impl<'a> ReadinessQueue<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes every registration.
    pub fn clear(&mut self) {
        self.listener = None;
        self.sockets.clear();
    }

    /// Registers the listening socket.
    pub fn include_listener(&mut self, listener: &'a TcpListener) {
        self.listener = Some(listener);
    }

    /// Registers a client connection under `key`.
    pub fn include(&mut self, key: &'a str, conn: &'a Connection) {
        self.sockets.push((key, conn));
    }

    /// Number of registered sockets, listener included.
    pub fn len(&self) -> usize {
        self.sockets.len() + usize::from(self.listener.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Blocks until some socket is ready or `timeout` elapses.
    ///
    /// Waiting on an empty queue is an error.
    pub async fn wait(&self, timeout: Duration) -> WaitStatus {
        if self.is_empty() {
            return WaitStatus::Error(io::Error::new(
                io::ErrorKind::InvalidInput,
                "readiness queue has no sockets",
            ));
        }
        match tokio::time::timeout(timeout, poll_fn(|cx| self.poll_ready(cx))).await {
            Ok(status) => status,
            Err(_) => WaitStatus::Timeout,
        }
    }

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<WaitStatus> {
        let mut activity = Activity::default();
        for (key, conn) in &self.sockets {
            match conn.stream().poll_read_ready(cx) {
                Poll::Ready(Ok(())) => activity.mark_ready(key),
                // Only this client is affected
                Poll::Ready(Err(e)) => {
                    tracing::debug!("[{}] Readiness poll failed: {}", conn.peer_addr(), e);
                    activity.mark_failed(key);
                }
                Poll::Pending => {}
            }
        }

        if let Some(listener) = self.listener {
            if let Poll::Ready(result) = listener.poll_accept(cx) {
                activity.accepted = Some(result);
            }
        }

        if activity.is_empty() {
            return Poll::Pending;
        }
        Poll::Ready(WaitStatus::Ready(activity))
    }
}
