//! Command channel to the monochromator controller.
//!
//! [`Model`] owns at most one TCP connection and serializes every exchange on
//! it: the connection lives inside an async mutex that is held for the whole
//! write-request/read-reply round trip, so replies can never be paired with
//! the wrong request. Methods take `&self`; share a model between tasks with
//! an `Arc`.
//!
//! Device-reported outcomes come back as [`Reply`] values. Transport problems
//! and protocol mismatches come back as [`ModelError`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use atmono_protocol::{Command, DeviceStatus, ProtocolError, Query, QueryReply, Reply};
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ModelConfig;
use crate::connection::Connection;
use crate::error::{ModelError, ModelResult};

// ============================================================================
// Snapshot
// ============================================================================

/// Every status field of the controller, read in one pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceSnapshot {
    /// Wavelength in nm.
    pub wavelength: f64,
    /// Grating index.
    pub grating: i32,
    /// Entrance slit width in mm.
    pub entrance_slit: f64,
    /// Exit slit width in mm.
    pub exit_slit: f64,
    /// Software status.
    pub status: DeviceStatus,
}

// ============================================================================
// Model
// ============================================================================

/// Typed, serialized interface to one controller.
#[derive(Debug)]
pub struct Model {
    config: ModelConfig,
    /// The command lock. `None` while disconnected.
    connection: Mutex<Option<Connection>>,
    connected: AtomicBool,
    /// Wakes the in-flight exchange on disconnect.
    closed: Notify,
}

impl Default for Model {
    fn default() -> Self {
        Model::new(ModelConfig::default())
    }
}

impl Model {
    /// Create a new, disconnected model.
    pub fn new(config: ModelConfig) -> Self {
        Model {
            config,
            connection: Mutex::new(None),
            connected: AtomicBool::new(false),
            closed: Notify::new(),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Whether a connection is open.
    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Connect to the controller.
    ///
    /// Fails with [`ModelError::AlreadyConnected`] if a connection is open.
    /// No data is exchanged.
    pub async fn connect(&self, host: &str, port: u16) -> ModelResult<()> {
        let mut guard = self.connection.lock().await;
        if guard.is_some() {
            return Err(ModelError::AlreadyConnected);
        }

        debug!(host, port, "Connecting");
        let connection = Connection::open(host, port, self.config.connection_timeout()).await?;
        info!(peer = %connection.peer(), "Connected to controller");

        *guard = Some(connection);
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    /// Disconnect from the controller.
    ///
    /// Idempotent. A request in flight fails with
    /// [`ModelError::ConnectionClosed`]. Errors while closing are logged, not
    /// returned.
    pub async fn disconnect(&self) {
        self.closed.notify_waiters();

        let connection = self.connection.lock().await.take();
        self.connected.store(false, Ordering::Release);

        if let Some(mut connection) = connection {
            let peer = connection.peer();
            if let Err(e) = connection.shutdown().await {
                warn!(%peer, error = %e, "Error while closing connection");
            }
            info!(%peer, "Disconnected from controller");
        }
    }

    // ========================================================================
    // Raw exchange
    // ========================================================================

    /// Send one request line and wait for one reply line.
    ///
    /// The deadline is `timeout`, capped by the configured read timeout. A
    /// write error, EOF or missed deadline drops the connection, since a late
    /// reply would otherwise be read as the answer to the next request.
    pub async fn send(&self, request: &str, timeout: Duration) -> ModelResult<String> {
        // Register before queueing on the lock so a disconnect issued while
        // waiting is not missed.
        let closed = self.closed.notified();

        let mut guard = self.connection.lock().await;
        let connection = guard.as_mut().ok_or(ModelError::NotConnected)?;
        let timeout = timeout.min(self.config.read_timeout());

        debug!(request, "Sending");
        let result = tokio::select! {
            _ = closed => Err(ModelError::ConnectionClosed),
            result = exchange(connection, request, timeout) => result,
        };

        match result {
            Ok(reply) => {
                debug!(request, reply = %reply, "Received");
                Ok(reply)
            }
            Err(e) => {
                if e.is_transport() && guard.take().is_some() {
                    self.connected.store(false, Ordering::Release);
                    warn!(request, error = %e, "Dropping connection");
                }
                Err(e)
            }
        }
    }

    /// Send a command and decode its outcome.
    pub async fn command(&self, command: &Command) -> ModelResult<Reply> {
        let reply = self.send(&command.to_line(), self.config.command_timeout()).await?;
        Ok(Reply::parse(&reply)?)
    }

    /// Send a query and decode its answer.
    pub async fn query(&self, query: Query) -> ModelResult<QueryReply> {
        let reply = self.send(query.as_str(), self.config.command_timeout()).await?;
        Ok(query.parse_reply(&reply)?)
    }

    // ========================================================================
    // Typed operations
    // ========================================================================

    /// Reset the controller (`!RST 1`).
    pub async fn reset_controller(&self) -> ModelResult<Reply> {
        self.command(&Command::Reset).await
    }

    /// Get the current wavelength in nm.
    pub async fn get_wavelength(&self) -> ModelResult<f64> {
        match self.query(Query::Wavelength).await? {
            QueryReply::Wavelength(value) => Ok(value),
            other => Err(mismatch(Query::Wavelength, other)),
        }
    }

    /// Get the current grating index.
    pub async fn get_grating(&self) -> ModelResult<i32> {
        match self.query(Query::Grating).await? {
            QueryReply::Grating(value) => Ok(value),
            other => Err(mismatch(Query::Grating, other)),
        }
    }

    /// Get the entrance slit width in mm.
    pub async fn get_entrance_slit(&self) -> ModelResult<f64> {
        match self.query(Query::EntranceSlit).await? {
            QueryReply::EntranceSlit(value) => Ok(value),
            other => Err(mismatch(Query::EntranceSlit, other)),
        }
    }

    /// Get the exit slit width in mm.
    pub async fn get_exit_slit(&self) -> ModelResult<f64> {
        match self.query(Query::ExitSlit).await? {
            QueryReply::ExitSlit(value) => Ok(value),
            other => Err(mismatch(Query::ExitSlit, other)),
        }
    }

    /// Get the controller status.
    pub async fn get_status(&self) -> ModelResult<DeviceStatus> {
        match self.query(Query::Status).await? {
            QueryReply::Status(status) => Ok(status),
            other => Err(mismatch(Query::Status, other)),
        }
    }

    /// Move to a wavelength in nm.
    pub async fn set_wavelength(&self, wavelength: f64) -> ModelResult<Reply> {
        self.command(&Command::SetWavelength { wavelength }).await
    }

    /// Select a grating.
    pub async fn set_grating(&self, grating: i32) -> ModelResult<Reply> {
        self.command(&Command::SetGrating { grating }).await
    }

    /// Set the entrance slit width in mm.
    pub async fn set_entrance_slit(&self, width: f64) -> ModelResult<Reply> {
        self.command(&Command::SetEntranceSlit { width }).await
    }

    /// Set the exit slit width in mm.
    pub async fn set_exit_slit(&self, width: f64) -> ModelResult<Reply> {
        self.command(&Command::SetExitSlit { width }).await
    }

    /// Set the wavelength calibration offset in nm.
    pub async fn set_calibrate_wavelength(&self, offset: f64) -> ModelResult<Reply> {
        self.command(&Command::CalibrateWavelength { offset }).await
    }

    /// Set wavelength, grating and both slits in one command.
    pub async fn set_all(
        &self,
        wavelength: f64,
        grating: i32,
        entrance_slit: f64,
        exit_slit: f64,
    ) -> ModelResult<Reply> {
        debug!(wavelength, grating, entrance_slit, exit_slit, "Setting all");
        self.command(&Command::SetAll {
            wavelength,
            grating,
            entrance_slit,
            exit_slit,
        })
        .await
    }

    /// Read every status field.
    pub async fn snapshot(&self) -> ModelResult<DeviceSnapshot> {
        Ok(DeviceSnapshot {
            wavelength: self.get_wavelength().await?,
            grating: self.get_grating().await?,
            entrance_slit: self.get_entrance_slit().await?,
            exit_slit: self.get_exit_slit().await?,
            status: self.get_status().await?,
        })
    }

    // ========================================================================
    // Readiness
    // ========================================================================

    /// Poll the status until the controller reports READY.
    ///
    /// `label` names the command being waited on; labels containing
    /// "grating" get the grating timeout. FAULT and OFFLINE end the wait
    /// immediately.
    pub async fn wait_ready(&self, label: &str) -> ModelResult<()> {
        let timeout = self.config.wait_timeout_for(label);
        let interval = self.config.wait_ready_interval();
        let start = Instant::now();

        loop {
            let status = self.get_status().await?;
            match status {
                DeviceStatus::Ready => {
                    debug!(label, elapsed = ?start.elapsed(), "Controller ready");
                    return Ok(());
                }
                DeviceStatus::Fault => {
                    return Err(ModelError::DeviceFault {
                        label: label.to_string(),
                    })
                }
                DeviceStatus::Offline => {
                    return Err(ModelError::DeviceOffline {
                        label: label.to_string(),
                    })
                }
                DeviceStatus::SettingUp => {}
            }

            if start.elapsed() > timeout {
                return Err(ModelError::WaitTimeout {
                    label: label.to_string(),
                    timeout,
                });
            }

            debug!(label, %status, "Waiting for controller");
            tokio::time::sleep(interval).await;
        }
    }
}

/// Write a request and read its reply within `timeout`.
async fn exchange(connection: &mut Connection, request: &str, timeout: Duration) -> ModelResult<String> {
    connection.write_line(request).await?;

    match tokio::time::timeout(timeout, connection.read_line()).await {
        Ok(result) => result,
        Err(_) => Err(ModelError::Timeout {
            request: request.to_string(),
            timeout,
        }),
    }
}

fn mismatch(query: Query, got: QueryReply) -> ModelError {
    ModelError::Protocol(ProtocolError::UnexpectedReply {
        expected: query.tag(),
        got: got.to_line(),
    })
}
