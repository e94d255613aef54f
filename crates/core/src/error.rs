use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IconError {
    #[error("icon code {code:?} must be exactly 3 characters, got {len}")]
    InvalidLength { code: String, len: usize },

    #[error("icon code {code:?} has unknown category {category:?}")]
    UnknownCategory { code: String, category: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    // A numeric argument does not fit its one-byte field.
    #[error("{field} must be in {min}..={max}, got {value}")]
    OutOfRange { field: &'static str, value: i64, min: i64, max: i64 },

    #[error("icon payload must be {expected} hex characters, got {actual}")]
    PayloadLength { expected: usize, actual: usize },

    #[error("invalid hex digit {found:?} at position {position}")]
    InvalidHex { found: char, position: usize },

    #[error("unknown opcode {0:?}")]
    UnknownOpcode(String),

    #[error("command {command:?} must be exactly {expected} characters")]
    Length { command: String, expected: usize },
}
