//! ATMonochromator TCP Protocol
//!
//! This crate provides types and utilities for talking to the monochromator
//! controller over its line-based TCP interface. It is shared by the host-side
//! client and by the simulated controller, so both ends encode and decode the
//! same vocabulary.
//!
//! # Protocol Overview
//!
//! - **Commands** (host → controller): `!<VERB> <args...>`, e.g. `!WL 532.5`
//! - **Queries** (host → controller): `?<VERB>`, e.g. `?SWST`
//! - **Replies** (controller → host): an outcome tag for commands
//!   (`#OK`, `#OUR`, `??`, `#BUSY`, `#RJCT`) or `#<TAG> <value>` for queries
//!
//! Every line is terminated with `\r\n`. Exactly one reply is sent per request.
//!
//! # Example
//!
//! ```rust
//! use atmono_protocol::{Command, Query, QueryReply, Reply};
//!
//! let line = Command::SetGrating { grating: 1 }.to_line();
//! assert_eq!(line, "!GR 1");
//!
//! assert_eq!(Reply::parse("#OK").unwrap(), Reply::Ok);
//! assert_eq!(
//!     Query::Wavelength.parse_reply("#WL 320").unwrap(),
//!     QueryReply::Wavelength(320.0)
//! );
//! ```

mod codec;
mod commands;
mod error;
mod responses;
mod status;

pub use codec::*;
pub use commands::*;
pub use error::*;
pub use responses::*;
pub use status::*;
