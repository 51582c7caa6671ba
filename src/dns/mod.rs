mod common;
mod enums;
mod header;
mod packet;
mod question;
mod resource;

pub use common::*;
pub use enums::*;
pub use header::*;
pub use packet::*;
pub use question::*;
pub use resource::*;

use std::fmt;

/// Wire (de)serialization failure. Kept separate from `crate::error::CoreError`
/// since a malformed packet is a protocol-layer concern, not a zone-core one;
/// `CoreError::Malformed` wraps this at the boundary between the two.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    NotEnoughData,
    InvalidLabel,
    InvalidRecordType(u16),
    InvalidClass(u16),
    Io(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::NotEnoughData => write!(f, "not enough data in packet"),
            ParseError::InvalidLabel => write!(f, "invalid or malformed dname label"),
            ParseError::InvalidRecordType(t) => write!(f, "invalid record type: {t}"),
            ParseError::InvalidClass(c) => write!(f, "invalid record class: {c}"),
            ParseError::Io(msg) => write!(f, "io error: {msg}"),
        }
    }
}

impl std::error::Error for ParseError {}

impl From<std::io::Error> for ParseError {
    fn from(e: std::io::Error) -> Self {
        ParseError::Io(e.to_string())
    }
}
