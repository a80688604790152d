//! ATMonochromator command channel.
//!
//! Host-side client for the monochromator controller. A [`Model`] holds one
//! TCP connection, runs one request at a time on it, and turns replies into
//! typed values: [`atmono_protocol::Reply`] for commands, plain numbers and
//! [`atmono_protocol::DeviceStatus`] for queries. After a state-changing
//! command, [`Model::wait_ready`] polls the status until the controller is
//! READY again.
//!
//! # Example
//!
//! ```rust,no_run
//! use atmono_model::{Model, ModelConfig};
//!
//! # async fn run() -> atmono_model::ModelResult<()> {
//! let model = Model::new(ModelConfig::default());
//! model.connect("127.0.0.1", 50000).await?;
//!
//! if model.set_wavelength(532.5).await?.is_ok() {
//!     model.wait_ready("change wavelength").await?;
//! }
//! println!("at {} nm", model.get_wavelength().await?);
//!
//! model.disconnect().await;
//! # Ok(())
//! # }
//! ```

mod config;
mod connection;
mod error;
mod model;

pub use config::*;
pub use error::*;
pub use model::*;
