//! JSON-lines bridge to a presentation process
//!
//! Reads one [`Command`] per line from an input stream and writes
//! [`Outbound`] lines to an output stream: a reply for every command and an
//! event line for everything published on the registry's bus.

pub mod protocol;
mod server;

pub use protocol::{Command, Outbound, ReplyError};
pub use server::{Bridge, execute};
