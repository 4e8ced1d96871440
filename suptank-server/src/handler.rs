//! Command handlers.
//!
//! Maps an opcode received on an established session to its action and
//! writes exactly one response. Mutating commands require both a readable
//! payload and an admin user; otherwise the plant is left untouched and
//! the client gets `ERROR`. A payload that cannot be read ends the session.

use crate::plant::PlantAdapter;
use crate::server::ServerStats;
use crate::session::Session;
use crate::transport::TransportError;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use suptank_plant::Valve;
use suptank_protocol::{Encoder, Opcode};

/// What the dispatcher should do with the session after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Keep serving the session.
    Continue,
    /// Close the session.
    Close,
}

/// A privileged plant mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Actuation {
    Valve(Valve),
    Pump,
}

/// Command handler.
pub struct CommandHandler {
    plant: Arc<PlantAdapter>,
    /// Bounds payload reads and response writes.
    io_timeout: Duration,
    stats: Arc<ServerStats>,
}

impl CommandHandler {
    /// Creates a new command handler.
    pub fn new(plant: Arc<PlantAdapter>, io_timeout: Duration, stats: Arc<ServerStats>) -> Self {
        Self {
            plant,
            io_timeout,
            stats,
        }
    }

    /// Handles one command whose opcode has already been read.
    ///
    /// Returns `Err` only when the session can no longer be used.
    pub async fn handle(
        &self,
        login: &str,
        is_admin: bool,
        session: &mut Session,
        code: i16,
    ) -> Result<Disposition, TransportError> {
        session.record_command();
        self.stats.commands_handled.fetch_add(1, Ordering::Relaxed);

        let op = match Opcode::from_code(code) {
            Some(op) => op,
            None => {
                tracing::debug!(
                    "[{}] {} sent unknown opcode {}",
                    session.remote_addr(),
                    login,
                    code
                );
                return self.reject(session).await;
            }
        };
        tracing::debug!("[{}] {} -> {}", session.remote_addr(), login, op);

        match op {
            Opcode::GetData => self.handle_get_data(session).await,
            Opcode::SetV1 => {
                self.handle_set(login, is_admin, session, Actuation::Valve(Valve::V1))
                    .await
            }
            Opcode::SetV2 => {
                self.handle_set(login, is_admin, session, Actuation::Valve(Valve::V2))
                    .await
            }
            Opcode::SetPump => {
                self.handle_set(login, is_admin, session, Actuation::Pump)
                    .await
            }
            Opcode::Logout => self.handle_logout(login, session).await,
            // LOGIN is only valid on a fresh connection; response codes are
            // never valid requests
            Opcode::Login | Opcode::Ok | Opcode::AdminOk | Opcode::Error => {
                self.reject(session).await
            }
        }
    }

    async fn handle_get_data(&self, session: &mut Session) -> Result<Disposition, TransportError> {
        let reply = Encoder::data_reply(&self.plant.snapshot());
        session
            .connection_mut()
            .write_bytes(&reply, self.io_timeout)
            .await?;
        Ok(Disposition::Continue)
    }

    async fn handle_set(
        &self,
        login: &str,
        is_admin: bool,
        session: &mut Session,
        actuation: Actuation,
    ) -> Result<Disposition, TransportError> {
        let arg = match session.connection_mut().read_i16(self.io_timeout).await {
            Ok(arg) => arg,
            Err(TransportError::Disconnected) => return Err(TransportError::Disconnected),
            Err(e) => {
                // The opcode is consumed but its payload is not, so the stream
                // is out of step and the session cannot continue
                tracing::warn!(
                    "[{}] Lost {:?} payload from {}: {}",
                    session.remote_addr(),
                    actuation,
                    login,
                    e
                );
                self.stats.commands_rejected.fetch_add(1, Ordering::Relaxed);
                let _ = session
                    .connection_mut()
                    .write_opcode(Opcode::Error, self.io_timeout)
                    .await;
                return Ok(Disposition::Close);
            }
        };

        if !is_admin {
            tracing::warn!(
                "[{}] {} is not allowed to issue {:?}",
                session.remote_addr(),
                login,
                actuation
            );
            return self.reject(session).await;
        }

        match actuation {
            Actuation::Valve(valve) => {
                let open = arg != 0;
                self.plant.set_valve(valve, open);
                tracing::info!(
                    "[{}] {} set {:?} {}",
                    session.remote_addr(),
                    login,
                    valve,
                    if open { "open" } else { "closed" }
                );
            }
            Actuation::Pump => {
                // The wire carries a signed word; the pump takes the raw bits
                let input = arg as u16;
                self.plant.set_pump_input(input);
                tracing::info!(
                    "[{}] {} set pump input to {}",
                    session.remote_addr(),
                    login,
                    input
                );
            }
        }

        session
            .connection_mut()
            .write_opcode(Opcode::Ok, self.io_timeout)
            .await?;
        Ok(Disposition::Continue)
    }

    async fn handle_logout(
        &self,
        login: &str,
        session: &mut Session,
    ) -> Result<Disposition, TransportError> {
        tracing::info!("[{}] {} logged out", session.remote_addr(), login);
        session
            .connection_mut()
            .write_opcode(Opcode::Ok, self.io_timeout)
            .await?;
        Ok(Disposition::Close)
    }

    async fn reject(&self, session: &mut Session) -> Result<Disposition, TransportError> {
        self.stats.commands_rejected.fetch_add(1, Ordering::Relaxed);
        session
            .connection_mut()
            .write_opcode(Opcode::Error, self.io_timeout)
            .await?;
        Ok(Disposition::Continue)
    }
}

impl std::fmt::Debug for CommandHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHandler")
            .field("plant", &self.plant)
            .field("io_timeout", &self.io_timeout)
            .finish()
    }
}
