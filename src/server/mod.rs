//! TCP front end speaking the admission line protocol.

mod listener;
mod protocol;
mod service;

pub use listener::{Server, DEFAULT_MAX_LINE_BYTES};
pub use protocol::{Command, ParseError, Reply};
pub use service::CommandService;
