//! Session dispatcher.
//!
//! One task drives the whole server. Each iteration rebuilds the readiness
//! queue from the listener plus every live session, waits on it, serves one
//! opcode per ready session and finally runs the login handshake for a
//! newly accepted connection. The directory lock is held for the whole
//! iteration; outside mutations signal the wakeup first so the wait gives
//! the lock up promptly.

use crate::directory::User;
use crate::error::FatalError;
use crate::handler::{CommandHandler, Disposition};
use crate::login;
use crate::readiness::{Activity, ReadinessQueue, WaitStatus};
use crate::server::{ServerConfig, ServerStats};
use crate::session::Session;
use crate::transport::{Connection, TransportError};
use crate::SharedDirectory;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{watch, Notify};

/// Result of one loop iteration.
#[derive(Debug)]
pub enum Step {
    Continue,
    Fatal(FatalError),
}

/// How the dispatcher loop ended.
#[derive(Debug)]
pub enum DispatchExit {
    /// A stop was requested.
    Stopped,
    /// A transport-level failure ended the loop.
    Fatal(FatalError),
    /// The dispatcher task panicked or was cancelled.
    Aborted,
}

impl DispatchExit {
    pub fn is_fatal(&self) -> bool {
        matches!(self, DispatchExit::Fatal(_))
    }
}

/// The event loop.
pub struct Dispatcher {
    listener: Option<TcpListener>,
    directory: SharedDirectory,
    handler: CommandHandler,
    shutdown: watch::Receiver<bool>,
    wakeup: Arc<Notify>,
    wait_timeout: Duration,
    opcode_timeout: Duration,
    login_timeout: Duration,
    stats: Arc<ServerStats>,
}

impl Dispatcher {
    pub fn new(
        listener: TcpListener,
        directory: SharedDirectory,
        handler: CommandHandler,
        shutdown: watch::Receiver<bool>,
        wakeup: Arc<Notify>,
        config: &ServerConfig,
        stats: Arc<ServerStats>,
    ) -> Self {
        Self {
            listener: Some(listener),
            directory,
            handler,
            shutdown,
            wakeup,
            wait_timeout: config.wait_timeout,
            opcode_timeout: config.opcode_timeout,
            login_timeout: config.login_timeout,
            stats,
        }
    }

    /// Runs until a stop is requested or a fatal error occurs.
    ///
    /// Every live session and the listener are closed before returning,
    /// whichever way the loop ended.
    pub async fn run(mut self) -> DispatchExit {
        tracing::info!("Dispatcher started");

        let exit = loop {
            if self.stop_requested() {
                break DispatchExit::Stopped;
            }
            match self.step().await {
                Step::Continue => {}
                Step::Fatal(e) => {
                    tracing::error!("Dispatcher failed: {}", e);
                    break DispatchExit::Fatal(e);
                }
            }
        };

        self.teardown().await;
        tracing::info!("Dispatcher stopped");
        exit
    }

    /// A dropped controller counts as a stop request.
    fn stop_requested(&self) -> bool {
        *self.shutdown.borrow() || self.shutdown.has_changed().is_err()
    }

    /// Runs one iteration.
    pub async fn step(&mut self) -> Step {
        let listener = match self.listener.as_ref() {
            Some(listener) => listener,
            None => return Step::Fatal(FatalError::ListenerClosed),
        };
        if let Err(e) = listener.local_addr() {
            tracing::error!("Listening socket is unusable: {}", e);
            return Step::Fatal(FatalError::ListenerClosed);
        }

        let directory = Arc::clone(&self.directory);
        let mut users = directory.lock().await;

        let status = {
            let mut queue = ReadinessQueue::new();
            queue.include_listener(listener);
            for user in users.iter() {
                if let Some(session) = user.session() {
                    queue.include(user.login(), session.connection());
                }
            }

            tokio::select! {
                biased;
                _ = self.shutdown.changed() => return Step::Continue,
                _ = self.wakeup.notified() => return Step::Continue,
                status = queue.wait(self.wait_timeout) => status,
            }
        };

        let mut activity = match status {
            WaitStatus::Ready(activity) => activity,
            WaitStatus::Timeout => return Step::Continue,
            WaitStatus::Error(e) => return Step::Fatal(FatalError::Wait(e)),
        };

        for user in users.iter_mut() {
            self.settle(user, &activity).await;
        }

        match activity.take_accepted() {
            Some(Ok((stream, peer))) => {
                self.stats.connections_accepted.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("[{}] Connection accepted", peer);
                let conn = Connection::new(stream, peer);
                login::admit(&mut users, conn, self.login_timeout, &self.stats).await;
            }
            Some(Err(e)) => tracing::warn!("Failed to accept connection: {}", e),
            None => {}
        }

        Step::Continue
    }

    /// Acts on what the readiness wait reported for `user`.
    async fn settle(&self, user: &mut User, activity: &Activity) {
        if activity.had_error(user.login()) {
            if let Some(session) = user.session() {
                tracing::warn!(
                    "[{}] Dropping {}: socket failed",
                    session.remote_addr(),
                    user.login()
                );
            }
            self.stats.disconnects.fetch_add(1, Ordering::Relaxed);
            user.disconnect().await;
        } else if activity.had_activity(user.login()) {
            self.serve(user).await;
        }
    }

    /// Serves one opcode for a user whose socket reported activity.
    async fn serve(&self, user: &mut User) {
        let (peer, age) = match user.session() {
            Some(session) => (session.remote_addr(), session.age()),
            None => return,
        };
        let result = match user.parts_mut() {
            Some((login, is_admin, session)) => {
                self.serve_session(login, is_admin, session).await
            }
            None => return,
        };

        match result {
            Ok(Disposition::Continue) => {}
            Ok(Disposition::Close) => user.disconnect().await,
            Err(e) => {
                if e.is_disconnect() {
                    tracing::info!("[{}] {} disconnected after {:?}", peer, user.login(), age);
                } else {
                    tracing::warn!("[{}] Dropping {}: {}", peer, user.login(), e);
                }
                self.stats.disconnects.fetch_add(1, Ordering::Relaxed);
                user.disconnect().await;
            }
        }
    }

    async fn serve_session(
        &self,
        login: &str,
        is_admin: bool,
        session: &mut Session,
    ) -> Result<Disposition, TransportError> {
        let code = session
            .connection_mut()
            .read_ready_opcode(self.opcode_timeout)
            .await?;
        match code {
            Some(code) => self.handler.handle(login, is_admin, session, code).await,
            // Stale readiness
            None => Ok(Disposition::Continue),
        }
    }

    async fn teardown(&mut self) {
        self.directory.lock().await.close_all().await;
        self.listener = None;
    }
}
