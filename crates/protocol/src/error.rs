//! Protocol error types.

use thiserror::Error;

/// Errors that can occur while decoding an inbound frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("empty frame")]
    EmptyFrame,

    #[error("invalid packet opcode: {0:#04x}")]
    InvalidOpcode(u8),

    #[error("unexpected end of data")]
    UnexpectedEof,

    #[error("{0} trailing bytes after packet")]
    TrailingBytes(usize),

    #[error("string is not null-terminated")]
    UnterminatedString,

    #[error("string longer than {0} bytes")]
    StringTooLong(usize),

    #[error("string is not valid UTF-8")]
    InvalidUtf8,
}
