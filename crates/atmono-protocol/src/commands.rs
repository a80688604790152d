//! Requests that can be sent to the monochromator controller.
//!
//! Two kinds of request exist:
//! - State-changing commands: `!<VERB> <arg0> <arg1> ...`
//! - Queries: `?<VERB>` with no arguments
//!
//! The host side builds typed [`Command`]/[`Query`] values and encodes them.
//! The controller side decodes raw lines into [`Request`], keeping command
//! arguments as raw tokens so malformed numbers are rejected by the command
//! handler rather than by the codec.

use crate::codec::LineCodec;

// ============================================================================
// Command verbs
// ============================================================================

/// Verbs of state-changing commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandVerb {
    /// Set wavelength (`!WL`).
    Wavelength,
    /// Select grating (`!GR`).
    Grating,
    /// Set entrance slit width (`!ENS`).
    EntranceSlit,
    /// Set exit slit width (`!EXS`).
    ExitSlit,
    /// Calibrate wavelength offset (`!CLW`).
    CalibrateWavelength,
    /// Reset controller (`!RST`).
    Reset,
    /// Set wavelength, grating and both slits at once (`!SET`).
    SetAll,
}

impl CommandVerb {
    /// Get the verb string used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandVerb::Wavelength => "!WL",
            CommandVerb::Grating => "!GR",
            CommandVerb::EntranceSlit => "!ENS",
            CommandVerb::ExitSlit => "!EXS",
            CommandVerb::CalibrateWavelength => "!CLW",
            CommandVerb::Reset => "!RST",
            CommandVerb::SetAll => "!SET",
        }
    }

    /// Parse a verb from its wire representation. Matching is exact.
    pub fn from_str(s: &str) -> Option<CommandVerb> {
        match s {
            "!WL" => Some(CommandVerb::Wavelength),
            "!GR" => Some(CommandVerb::Grating),
            "!ENS" => Some(CommandVerb::EntranceSlit),
            "!EXS" => Some(CommandVerb::ExitSlit),
            "!CLW" => Some(CommandVerb::CalibrateWavelength),
            "!RST" => Some(CommandVerb::Reset),
            "!SET" => Some(CommandVerb::SetAll),
            _ => None,
        }
    }
}

impl std::fmt::Display for CommandVerb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Commands
// ============================================================================

/// State-changing commands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Move to a wavelength.
    SetWavelength {
        /// Wavelength in nm.
        wavelength: f64,
    },

    /// Select a grating.
    SetGrating {
        /// Grating index.
        grating: i32,
    },

    /// Set the entrance slit width.
    SetEntranceSlit {
        /// Width in mm.
        width: f64,
    },

    /// Set the exit slit width.
    SetExitSlit {
        /// Width in mm.
        width: f64,
    },

    /// Set the wavelength calibration offset.
    CalibrateWavelength {
        /// Offset in nm.
        offset: f64,
    },

    /// Reset the controller to its initial state.
    Reset,

    /// Set all positions in one move.
    SetAll {
        /// Wavelength in nm.
        wavelength: f64,
        /// Grating index.
        grating: i32,
        /// Entrance slit width in mm.
        entrance_slit: f64,
        /// Exit slit width in mm.
        exit_slit: f64,
    },
}

impl Command {
    /// The verb this command is sent with.
    pub fn verb(&self) -> CommandVerb {
        match self {
            Command::SetWavelength { .. } => CommandVerb::Wavelength,
            Command::SetGrating { .. } => CommandVerb::Grating,
            Command::SetEntranceSlit { .. } => CommandVerb::EntranceSlit,
            Command::SetExitSlit { .. } => CommandVerb::ExitSlit,
            Command::CalibrateWavelength { .. } => CommandVerb::CalibrateWavelength,
            Command::Reset => CommandVerb::Reset,
            Command::SetAll { .. } => CommandVerb::SetAll,
        }
    }

    /// Get the command line without the terminator.
    pub fn to_line(&self) -> String {
        let verb = self.verb();
        match self {
            Command::SetWavelength { wavelength } => format!("{} {}", verb, wavelength),
            Command::SetGrating { grating } => format!("{} {}", verb, grating),
            Command::SetEntranceSlit { width } | Command::SetExitSlit { width } => {
                format!("{} {}", verb, width)
            }
            Command::CalibrateWavelength { offset } => format!("{} {}", verb, offset),
            Command::Reset => format!("{} 1", verb),
            Command::SetAll {
                wavelength,
                grating,
                entrance_slit,
                exit_slit,
            } => format!(
                "{} {} {} {} {}",
                verb, wavelength, grating, entrance_slit, exit_slit
            ),
        }
    }

    /// Encode the command for transmission (including the `\r\n` terminator).
    pub fn encode(&self) -> Vec<u8> {
        LineCodec::encode_line(&self.to_line())
    }
}

// ============================================================================
// Queries
// ============================================================================

/// Queries for the current controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Query {
    /// Current wavelength (`?WL`).
    Wavelength,
    /// Current grating (`?GR`).
    Grating,
    /// Current entrance slit width (`?ENS`).
    EntranceSlit,
    /// Current exit slit width (`?EXS`).
    ExitSlit,
    /// Software status (`?SWST`).
    Status,
}

impl Query {
    /// All queries, in the order the controller documents them.
    pub const ALL: [Query; 5] = [
        Query::Wavelength,
        Query::Grating,
        Query::EntranceSlit,
        Query::ExitSlit,
        Query::Status,
    ];

    /// Get the query string used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Query::Wavelength => "?WL",
            Query::Grating => "?GR",
            Query::EntranceSlit => "?ENS",
            Query::ExitSlit => "?EXS",
            Query::Status => "?SWST",
        }
    }

    /// Get the tag the controller prefixes its answer with.
    pub fn tag(&self) -> &'static str {
        match self {
            Query::Wavelength => "#WL",
            Query::Grating => "#GR",
            Query::EntranceSlit => "#ENS",
            Query::ExitSlit => "#EXS",
            Query::Status => "#SWST",
        }
    }

    /// Parse a query from the whole received line.
    pub fn from_str(s: &str) -> Option<Query> {
        Query::ALL.into_iter().find(|query| query.as_str() == s)
    }

    /// Encode the query for transmission (including the `\r\n` terminator).
    pub fn encode(&self) -> Vec<u8> {
        LineCodec::encode_line(self.as_str())
    }
}

// ============================================================================
// Controller-side decoding
// ============================================================================

/// A received request line, decoded on the controller side.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// A state-changing command with its raw argument tokens.
    Command {
        /// The command verb.
        verb: CommandVerb,
        /// Raw argument tokens, unparsed.
        args: Vec<String>,
    },

    /// A query.
    Query(Query),

    /// Anything else. The controller answers these with `??`.
    Unknown(String),
}

impl Request {
    /// Decode a received line.
    ///
    /// Trailing whitespace is stripped. Lines whose first token starts with
    /// `?` are matched as a whole against the query vocabulary, so a query
    /// followed by stray arguments is unknown. All other lines are split on
    /// whitespace into a verb and its arguments.
    pub fn parse(line: &str) -> Request {
        let line = line.trim_end();
        let mut tokens = line.split_whitespace();

        let Some(first) = tokens.next() else {
            return Request::Unknown(line.to_string());
        };

        if first.starts_with('?') {
            return match Query::from_str(line) {
                Some(query) => Request::Query(query),
                None => Request::Unknown(line.to_string()),
            };
        }

        match CommandVerb::from_str(first) {
            Some(verb) => Request::Command {
                verb,
                args: tokens.map(str::to_string).collect(),
            },
            None => Request::Unknown(line.to_string()),
        }
    }
}
