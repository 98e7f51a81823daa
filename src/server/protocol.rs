//! Line protocol spoken by the admission server.
//!
//! One command per line, arguments separated by whitespace:
//!
//! ```text
//! ADMIT login/user/jsmith 10 100 login/ip/1.2.3.4 10 1000
//! 1 9 0 10
//! ADMIT login/user/jsmith 10 100 abc
//! ERR invalid arguments: cannot parse timestamp
//! ```

use std::fmt;

use crate::error::AdmissionError;
use crate::ratelimit::{AdmitRequest, BatchDecision};

/// A parsed client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `ADMIT (key cost capacity)+ [now]`
    Admit(AdmitRequest),
    /// `PING`
    Ping,
    /// `QUIT`
    Quit,
}

/// Why a line could not be turned into a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The line held nothing but whitespace.
    Empty,
    /// The command name is not recognized.
    Unknown(String),
    /// The command is known but its arguments are not.
    Admission(AdmissionError),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Empty => write!(f, "empty command"),
            ParseError::Unknown(name) => write!(f, "unknown command '{}'", name),
            ParseError::Admission(err) => write!(f, "{}", err),
        }
    }
}

impl Command {
    /// Parse one line. Command names are case-insensitive.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let mut words = line.split_whitespace();
        let name = words.next().ok_or(ParseError::Empty)?;
        let args: Vec<&str> = words.collect();

        match name.to_ascii_uppercase().as_str() {
            "ADMIT" => AdmitRequest::parse(&args)
                .map(Command::Admit)
                .map_err(ParseError::Admission),
            "PING" if args.is_empty() => Ok(Command::Ping),
            "QUIT" if args.is_empty() => Ok(Command::Quit),
            "PING" | "QUIT" => Err(ParseError::Admission(AdmissionError::Arity(format!(
                "{} takes no arguments",
                name.to_ascii_uppercase()
            )))),
            _ => Err(ParseError::Unknown(name.to_string())),
        }
    }
}

/// A reply line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `allowed remaining ready_after reset_after`, with `allowed` as `1`/`0`
    Decision(BatchDecision),
    /// `PONG`
    Pong,
    /// `BYE`, after which the server closes the connection
    Bye,
    /// `ERR <message>`
    Error(String),
}

impl Reply {
    /// Whether the connection should close after this reply.
    pub fn closes_connection(&self) -> bool {
        matches!(self, Reply::Bye)
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Decision(d) => write!(
                f,
                "{} {} {} {}",
                u8::from(d.allowed),
                d.remaining,
                d.ready_after,
                d.reset_after
            ),
            Reply::Pong => write!(f, "PONG"),
            Reply::Bye => write!(f, "BYE"),
            // Keep error replies on one line
            Reply::Error(msg) => write!(f, "ERR {}", msg.replace(['\r', '\n'], " ")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::LimitSpec;

    #[test]
    fn test_parse_admit() {
        let cmd = Command::parse("admit user 10 100 ip 1 5 42\r\n").unwrap();
        let Command::Admit(request) = cmd else {
            panic!("expected ADMIT");
        };
        assert_eq!(
            request.limits,
            vec![LimitSpec::new("user", 10, 100), LimitSpec::new("ip", 1, 5)]
        );
        assert_eq!(request.now, Some(42));
    }

    #[test]
    fn test_parse_ping_and_quit() {
        assert_eq!(Command::parse("PING"), Ok(Command::Ping));
        assert_eq!(Command::parse("  quit  "), Ok(Command::Quit));
        assert!(matches!(
            Command::parse("PING now"),
            Err(ParseError::Admission(AdmissionError::Arity(_)))
        ));
    }

    #[test]
    fn test_parse_empty_and_unknown() {
        assert_eq!(Command::parse("   "), Err(ParseError::Empty));
        assert_eq!(
            Command::parse("INCR x"),
            Err(ParseError::Unknown("INCR".to_string()))
        );
    }

    #[test]
    fn test_parse_admit_without_limiters() {
        assert!(matches!(
            Command::parse("ADMIT"),
            Err(ParseError::Admission(AdmissionError::Arity(_)))
        ));
    }

    #[test]
    fn test_reply_format() {
        let decision = BatchDecision {
            allowed: true,
            remaining: 9,
            ready_after: 0,
            reset_after: 10,
        };
        assert_eq!(Reply::Decision(decision).to_string(), "1 9 0 10");
        assert_eq!(Reply::Pong.to_string(), "PONG");
        assert_eq!(Reply::Error("bad\nthing".to_string()).to_string(), "ERR bad thing");
    }
}
