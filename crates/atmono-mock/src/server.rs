//! TCP front end for the simulated controller.
//!
//! One client is served at a time. Accepting a client brings the controller
//! to READY; losing it takes the controller OFFLINE. Each received line is
//! answered with exactly one `<reply>\r\n` line, in arrival order.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use atmono_protocol::{LineCodec, Reply, Response};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::SimulationConfig;
use crate::device::MockDevice;
use crate::error::MockResult;

/// A running mock controller bound to a TCP port.
#[derive(Debug)]
pub struct MockServer {
    local_addr: SocketAddr,
    device: Arc<MockDevice>,
    task: JoinHandle<()>,
}

impl MockServer {
    /// Validate the configuration, bind the listener and start serving.
    ///
    /// A configured port of 0 binds an ephemeral port; see [`MockServer::port`].
    pub async fn start(config: SimulationConfig) -> MockResult<MockServer> {
        config.validate()?;

        let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
        let local_addr = listener.local_addr()?;
        let device = Arc::new(MockDevice::new(config));

        info!(addr = %local_addr, "Mock controller listening");

        let task = tokio::spawn(run_listener(listener, device.clone()));

        Ok(MockServer {
            local_addr,
            device,
            task,
        })
    }

    /// Get the bound port.
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Get the bound host address.
    pub fn host(&self) -> String {
        self.local_addr.ip().to_string()
    }

    /// Get the bound socket address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get the simulated device.
    pub fn device(&self) -> Arc<MockDevice> {
        self.device.clone()
    }

    /// Stop listening and drop the connected client, if any.
    pub fn stop(&self) {
        if !self.task.is_finished() {
            info!(addr = %self.local_addr, "Stopping mock controller");
        }
        self.task.abort();
        self.device.client_disconnected();
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Accept clients one at a time for as long as the listener lives.
async fn run_listener(listener: TcpListener, device: Arc<MockDevice>) {
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!(error = %e, "Accept failed, listener stopping");
                return;
            }
        };

        info!(peer = %peer_addr, "Client connected");
        device.client_connected();

        let result = handle_connection(stream, &device).await;

        device.client_disconnected();
        match result {
            Ok(()) => info!(peer = %peer_addr, "Client disconnected"),
            Err(e) => warn!(peer = %peer_addr, error = %e, "Connection error"),
        }
    }
}

/// Serve a single client until it closes the connection.
async fn handle_connection(mut stream: TcpStream, device: &Arc<MockDevice>) -> io::Result<()> {
    let (mut reader, mut writer) = stream.split();
    let mut codec = LineCodec::new();
    let mut read_buf = [0u8; 1024];

    loop {
        let n = reader.read(&mut read_buf).await?;
        if n == 0 {
            return Ok(());
        }
        codec.push(&read_buf[..n]);

        loop {
            let response = match codec.decode_line() {
                Ok(Some(line)) => dispatch(device, line).await,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Discarding request");
                    Response::Command(Reply::Invalid)
                }
            };

            writer.write_all(&response.encode()).await?;
            writer.flush().await?;
        }
    }
}

/// Aborts the wrapped task when dropped, so a request handler does not
/// outlive the connection that issued it.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Run one request in its own task so a panicking handler cannot take the
/// connection down with it.
async fn dispatch(device: &Arc<MockDevice>, line: String) -> Response {
    let device = device.clone();
    let mut handler = AbortOnDrop(tokio::spawn(async move { device.handle_line(&line).await }));

    match (&mut handler.0).await {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "Request handler failed");
            debug!("Answering failed request with {}", Reply::Invalid.as_str());
            Response::Command(Reply::Invalid)
        }
    }
}
