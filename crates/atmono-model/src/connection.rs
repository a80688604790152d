//! Line-oriented TCP link to the controller.

use std::net::SocketAddr;
use std::time::Duration;

use atmono_protocol::LineCodec;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::trace;

use crate::error::{ModelError, ModelResult};

/// One open TCP session: both halves of the stream plus the reply decoder.
#[derive(Debug)]
pub(crate) struct Connection {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    codec: LineCodec,
    peer: SocketAddr,
}

impl Connection {
    /// Open a connection, giving up after `timeout`.
    pub(crate) async fn open(host: &str, port: u16, timeout: Duration) -> ModelResult<Connection> {
        let addr = format!("{}:{}", host, port);

        let stream = match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(ModelError::Connect { addr, source }),
            Err(_) => return Err(ModelError::ConnectTimeout { addr, timeout }),
        };
        stream.set_nodelay(true)?;

        let peer = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();

        Ok(Connection {
            reader,
            writer,
            codec: LineCodec::new(),
            peer,
        })
    }

    /// Address of the controller.
    pub(crate) fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Write one line, adding the terminator.
    pub(crate) async fn write_line(&mut self, line: &str) -> ModelResult<()> {
        self.writer.write_all(&LineCodec::encode_line(line)).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Read the next non-empty line, without its terminator.
    ///
    /// EOF is reported as [`ModelError::ConnectionClosed`].
    pub(crate) async fn read_line(&mut self) -> ModelResult<String> {
        let mut read_buf = [0u8; 256];
        loop {
            if let Some(line) = self.codec.decode_line()? {
                return Ok(line);
            }

            let n = self.reader.read(&mut read_buf).await?;
            if n == 0 {
                return Err(ModelError::ConnectionClosed);
            }
            trace!(bytes = n, "Received data");
            self.codec.push(&read_buf[..n]);
        }
    }

    /// Close the write side so the controller sees EOF.
    pub(crate) async fn shutdown(&mut self) -> ModelResult<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}
