//! Simulated ATMonochromator controller.
//!
//! A second implementation of the controller protocol, used to exercise the
//! host-side client without hardware. [`MockDevice`] is the state machine;
//! [`MockServer`] puts it behind a single-client TCP listener.
//!
//! # Example
//!
//! ```rust,no_run
//! use atmono_mock::{MockServer, SimulationConfig};
//!
//! # async fn run() -> atmono_mock::MockResult<()> {
//! let server = MockServer::start(SimulationConfig::default()).await?;
//! println!("listening on {}:{}", server.host(), server.port());
//! server.stop();
//! # Ok(())
//! # }
//! ```

mod config;
mod device;
mod error;
mod server;

pub use config::*;
pub use device::*;
pub use error::*;
pub use server::*;
