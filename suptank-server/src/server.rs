//! Server lifecycle.
//!
//! [`Server::start`] brings the plant online, binds the listener and spawns
//! the dispatcher task. [`Server::stop`] signals the task, closes every
//! session, waits for the task to finish and brings the plant offline.
//! Both are idempotent.

use crate::directory::{UserDirectory, UserSummary};
use crate::dispatcher::{DispatchExit, Dispatcher};
use crate::error::ServerError;
use crate::handler::CommandHandler;
use crate::plant::PlantAdapter;
use crate::SharedDirectory;
use std::net::SocketAddr;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;
use suptank_plant::Plant;
use suptank_protocol::{PlantSnapshot, DEFAULT_PORT};
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Upper bound of one readiness wait.
    pub wait_timeout: Duration,
    /// Bound on completing a partially received opcode.
    pub opcode_timeout: Duration,
    /// Bound on command payload reads and response writes.
    pub payload_timeout: Duration,
    /// Bound on each read of the login handshake.
    pub login_timeout: Duration,
    /// Plant simulation tick (zero disables ticking).
    pub plant_tick: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            wait_timeout: Duration::from_secs(10),
            opcode_timeout: Duration::from_millis(50),
            payload_timeout: Duration::from_millis(1000),
            login_timeout: Duration::from_millis(2000),
            plant_tick: Duration::from_millis(100),
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    /// Sets the readiness wait timeout.
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    pub fn with_opcode_timeout(mut self, timeout: Duration) -> Self {
        self.opcode_timeout = timeout;
        self
    }

    pub fn with_payload_timeout(mut self, timeout: Duration) -> Self {
        self.payload_timeout = timeout;
        self
    }

    pub fn with_login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    /// Sets the plant tick. Zero disables ticking.
    pub fn with_plant_tick(mut self, tick: Duration) -> Self {
        self.plant_tick = tick;
        self
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_accepted: AtomicU64,
    pub logins_accepted: AtomicU64,
    pub logins_rejected: AtomicU64,
    pub sessions_superseded: AtomicU64,
    pub commands_handled: AtomicU64,
    pub commands_rejected: AtomicU64,
    pub disconnects: AtomicU64,
}

struct Running {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<DispatchExit>,
    local_addr: SocketAddr,
}

/// Supervisory server.
pub struct Server {
    config: ServerConfig,
    directory: SharedDirectory,
    plant: Arc<PlantAdapter>,
    wakeup: Arc<Notify>,
    stats: Arc<ServerStats>,
    lifecycle: Mutex<Option<Running>>,
}

impl Server {
    /// Creates a new server with an empty directory.
    pub fn new(config: ServerConfig, plant: Arc<dyn Plant>) -> Self {
        Self::with_directory(config, plant, UserDirectory::new())
    }

    /// Creates a new server with a pre-populated directory.
    pub fn with_directory(
        config: ServerConfig,
        plant: Arc<dyn Plant>,
        directory: UserDirectory,
    ) -> Self {
        let plant = Arc::new(PlantAdapter::new(plant, config.plant_tick));
        Self {
            config,
            directory: Arc::new(Mutex::new(directory)),
            plant,
            wakeup: Arc::new(Notify::new()),
            stats: Arc::new(ServerStats::default()),
            lifecycle: Mutex::new(None),
        }
    }

    /// Starts serving and returns the bound address.
    ///
    /// No-op if already running. On failure the plant is brought back
    /// offline and no listener is left open.
    pub async fn start(&self) -> Result<SocketAddr, ServerError> {
        let mut lifecycle = self.lifecycle.lock().await;

        if let Some(running) = lifecycle.as_ref() {
            if !running.handle.is_finished() {
                return Ok(running.local_addr);
            }
        }
        if let Some(finished) = lifecycle.take() {
            let exit = Self::join(finished.handle).await;
            tracing::warn!("Restarting after dispatcher exit: {:?}", exit);
            self.plant.bring_offline();
        }

        let runtime = Handle::try_current().map_err(|e| ServerError::Launch(e.to_string()))?;

        self.plant.bring_online();

        let addr = self.config.bind_addr;
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(source) => {
                self.plant.bring_offline();
                return Err(ServerError::Listen { addr, source });
            }
        };
        let local_addr = match listener.local_addr() {
            Ok(local_addr) => local_addr,
            Err(e) => {
                drop(listener);
                self.plant.bring_offline();
                return Err(ServerError::Io(e));
            }
        };

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handler = CommandHandler::new(
            Arc::clone(&self.plant),
            self.config.payload_timeout,
            Arc::clone(&self.stats),
        );
        let dispatcher = Dispatcher::new(
            listener,
            Arc::clone(&self.directory),
            handler,
            shutdown_rx,
            Arc::clone(&self.wakeup),
            &self.config,
            Arc::clone(&self.stats),
        );
        let handle = runtime.spawn(dispatcher.run());

        tracing::info!("Server listening on {}", local_addr);
        *lifecycle = Some(Running {
            shutdown,
            handle,
            local_addr,
        });
        Ok(local_addr)
    }

    /// Stops serving.
    ///
    /// Returns how the dispatcher ended, or `None` if the server was not
    /// running.
    pub async fn stop(&self) -> Option<DispatchExit> {
        let mut lifecycle = self.lifecycle.lock().await;
        let running = lifecycle.take()?;
        tracing::info!("Server shutting down");

        // Fails only if the loop already ended on its own
        let _ = running.shutdown.send(true);
        self.wakeup.notify_one();
        self.directory.lock().await.close_all().await;

        let exit = Self::join(running.handle).await;
        self.plant.bring_offline();
        tracing::info!("Server stopped: {:?}", exit);
        Some(exit)
    }

    async fn join(handle: JoinHandle<DispatchExit>) -> DispatchExit {
        match handle.await {
            Ok(exit) => exit,
            Err(e) => {
                tracing::error!("Dispatcher task failed: {}", e);
                DispatchExit::Aborted
            }
        }
    }

    /// Returns whether the dispatcher is running.
    pub async fn is_running(&self) -> bool {
        self.lifecycle
            .lock()
            .await
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// Returns the bound address while running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.lifecycle
            .lock()
            .await
            .as_ref()
            .map(|running| running.local_addr)
    }

    /// Adds a user with a plaintext password.
    pub async fn add_user(
        &self,
        login: &str,
        password: &str,
        is_admin: bool,
    ) -> Result<(), ServerError> {
        self.wakeup.notify_one();
        self.directory.lock().await.add(login, password, is_admin)?;
        tracing::info!("Added user {}", login);
        Ok(())
    }

    /// Adds a user with a SHA-256 hex digest of its password.
    pub async fn add_user_hashed(
        &self,
        login: &str,
        password_sha256: &str,
        is_admin: bool,
    ) -> Result<(), ServerError> {
        self.wakeup.notify_one();
        self.directory
            .lock()
            .await
            .add_hashed(login, password_sha256, is_admin)?;
        tracing::info!("Added user {}", login);
        Ok(())
    }

    /// Removes a user, closing its live session.
    pub async fn remove_user(&self, login: &str) -> Result<(), ServerError> {
        self.wakeup.notify_one();
        let mut user = self.directory.lock().await.remove(login)?;
        if user.is_connected() {
            tracing::info!("Closing session of removed user {}", login);
        }
        user.disconnect().await;
        tracing::info!("Removed user {}", login);
        Ok(())
    }

    /// Lists every user.
    pub async fn users(&self) -> Vec<UserSummary> {
        self.wakeup.notify_one();
        self.directory.lock().await.summaries()
    }

    /// Returns the current plant state, or `None` while the plant is offline.
    pub fn plant_snapshot(&self) -> Option<PlantSnapshot> {
        self.plant.is_online().then(|| self.plant.snapshot())
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("plant", &self.plant)
            .finish_non_exhaustive()
    }
}
