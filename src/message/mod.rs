//! Agent wire protocol: stdout records in, stdin records out

pub mod outbound;
pub mod parser;

pub use parser::{ParseFailure, parse_line};
