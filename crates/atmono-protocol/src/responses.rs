//! Reply parsing for the controller protocol.
//!
//! Commands are answered with a bare outcome tag (`#OK`, `#OUR`, `??`,
//! `#BUSY`, `#RJCT`). Queries are answered with `#<TAG> <value>`.

use crate::commands::Query;
use crate::codec::LineCodec;
use crate::error::{ProtocolError, ProtocolResult};
use crate::status::DeviceStatus;

// ============================================================================
// Command outcomes
// ============================================================================

/// Outcome of a state-changing command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reply {
    /// Accepted command (`#OK`).
    Ok,
    /// Argument out of range (`#OUR`).
    OutOfRange,
    /// Invalid or unknown command (`??`).
    Invalid,
    /// Controller busy executing another command (`#BUSY`).
    Busy,
    /// Rejected: wrong state or bad argument (`#RJCT`).
    Rejected,
}

impl Reply {
    /// Get the reply tag used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Reply::Ok => "#OK",
            Reply::OutOfRange => "#OUR",
            Reply::Invalid => "??",
            Reply::Busy => "#BUSY",
            Reply::Rejected => "#RJCT",
        }
    }

    /// Parse a command reply line.
    ///
    /// The first whitespace-separated token is matched against the reply
    /// vocabulary; anything else is a [`ProtocolError::UnknownReply`].
    pub fn parse(line: &str) -> ProtocolResult<Reply> {
        let token = line.split_whitespace().next().unwrap_or_default();
        match token {
            "#OK" => Ok(Reply::Ok),
            "#OUR" => Ok(Reply::OutOfRange),
            "??" => Ok(Reply::Invalid),
            "#BUSY" => Ok(Reply::Busy),
            "#RJCT" => Ok(Reply::Rejected),
            _ => Err(ProtocolError::UnknownReply(line.trim().to_string())),
        }
    }

    /// Check if the command was accepted.
    pub fn is_ok(&self) -> bool {
        matches!(self, Reply::Ok)
    }
}

impl std::fmt::Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Reply::Ok => "OK",
            Reply::OutOfRange => "OUT_OF_RANGE",
            Reply::Invalid => "INVALID",
            Reply::Busy => "BUSY",
            Reply::Rejected => "REJECTED",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Query answers
// ============================================================================

/// A typed answer to a [`Query`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QueryReply {
    /// Wavelength in nm.
    Wavelength(f64),
    /// Grating index.
    Grating(i32),
    /// Entrance slit width in mm.
    EntranceSlit(f64),
    /// Exit slit width in mm.
    ExitSlit(f64),
    /// Software status.
    Status(DeviceStatus),
}

impl QueryReply {
    /// The query this value answers.
    pub fn query(&self) -> Query {
        match self {
            QueryReply::Wavelength(_) => Query::Wavelength,
            QueryReply::Grating(_) => Query::Grating,
            QueryReply::EntranceSlit(_) => Query::EntranceSlit,
            QueryReply::ExitSlit(_) => Query::ExitSlit,
            QueryReply::Status(_) => Query::Status,
        }
    }

    /// Get the reply line without the terminator.
    pub fn to_line(&self) -> String {
        let tag = self.query().tag();
        match self {
            QueryReply::Wavelength(value)
            | QueryReply::EntranceSlit(value)
            | QueryReply::ExitSlit(value) => format!("{} {}", tag, value),
            QueryReply::Grating(value) => format!("{} {}", tag, value),
            QueryReply::Status(status) => format!("{} {}", tag, status.code()),
        }
    }

    /// Parse any query reply line, identifying the query from its tag.
    pub fn parse(line: &str) -> ProtocolResult<QueryReply> {
        let tag = line.split_whitespace().next().unwrap_or_default();
        match Query::ALL.into_iter().find(|query| query.tag() == tag) {
            Some(query) => query.parse_reply(line),
            None => Err(ProtocolError::UnknownReply(line.trim().to_string())),
        }
    }
}

impl Query {
    /// Parse the controller's answer to this query.
    ///
    /// A reply with a different tag means the conversation is out of step
    /// and is reported as [`ProtocolError::UnexpectedReply`].
    pub fn parse_reply(&self, line: &str) -> ProtocolResult<QueryReply> {
        let mut tokens = line.split_whitespace();
        let expected = self.tag();

        if tokens.next() != Some(expected) {
            return Err(ProtocolError::UnexpectedReply {
                expected,
                got: line.trim().to_string(),
            });
        }

        let raw = tokens.next().unwrap_or_default();
        let invalid = || ProtocolError::InvalidValue {
            tag: expected,
            value: raw.to_string(),
        };

        match self {
            Query::Wavelength => raw.parse().map(QueryReply::Wavelength).map_err(|_| invalid()),
            Query::Grating => raw.parse().map(QueryReply::Grating).map_err(|_| invalid()),
            Query::EntranceSlit => raw.parse().map(QueryReply::EntranceSlit).map_err(|_| invalid()),
            Query::ExitSlit => raw.parse().map(QueryReply::ExitSlit).map_err(|_| invalid()),
            Query::Status => {
                let code: i64 = raw.parse().map_err(|_| invalid())?;
                DeviceStatus::from_code(code).map(QueryReply::Status)
            }
        }
    }
}

// ============================================================================
// Controller responses
// ============================================================================

/// Anything the controller writes back for one request line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Response {
    /// Outcome of a command (or `??` for an unknown line).
    Command(Reply),
    /// Answer to a query.
    Query(QueryReply),
}

impl Response {
    /// Get the response line without the terminator.
    pub fn to_line(&self) -> String {
        match self {
            Response::Command(reply) => reply.as_str().to_string(),
            Response::Query(value) => value.to_line(),
        }
    }

    /// Encode the response for transmission (including the `\r\n` terminator).
    pub fn encode(&self) -> Vec<u8> {
        LineCodec::encode_line(&self.to_line())
    }
}

impl From<Reply> for Response {
    fn from(reply: Reply) -> Self {
        Response::Command(reply)
    }
}

impl From<QueryReply> for Response {
    fn from(value: QueryReply) -> Self {
        Response::Query(value)
    }
}
