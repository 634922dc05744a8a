use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PFileError>;
pub type DeserializationResult<T> = std::result::Result<T, DeserializationError>;

/// Errors raised while interpreting bytes (header fields, name table, opcode stream).
///
/// Offsets are relative to the buffer the failing stage was handed.
#[derive(Debug, Error)]
pub enum DeserializationError {
    #[error("offset {offset}: truncated {what} (need {need} bytes, have {have})")]
    Truncated {
        what: &'static str,
        offset: u64,
        need: usize,
        have: usize,
    },

    #[error("unsupported minor version tag `{}`, expected `v00.00`", String::from_utf8_lossy(.found))]
    InvalidMinorVersion { found: [u8; 6] },

    #[error("declared compressed length {declared} does not match payload length {actual}")]
    CompressedLengthMismatch { declared: u32, actual: usize },

    #[error("declared {what} must be greater than zero")]
    ZeroLength { what: &'static str },

    #[error("decoded block is {len} bytes, too short to hold the 7 group counts")]
    DecodedBlockTooShort { len: usize },

    #[error(
        "offset {offset}: name table ended before entry {index} of group {group} was terminated"
    )]
    TruncatedNameTable {
        group: usize,
        index: u32,
        offset: usize,
    },

    #[error("offset {offset}: identifier reference {id} is out of range (name table has {table_len} entries)")]
    BadIdentifierIndex {
        offset: usize,
        id: i64,
        table_len: usize,
    },

    #[error("offset {offset}: identifier reference is missing its second byte")]
    TruncatedIdentifierReference { offset: usize },

    #[error("offset {offset}: unknown opcode `{value:#04x}`")]
    UnknownOpcode { offset: usize, value: u8 },
}

/// Errors surfaced by the decode pipeline.
#[derive(Debug, Error)]
pub enum PFileError {
    #[error("p-file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to open file {}: {source}", path.display())]
    FailedToOpenFile { path: PathBuf, source: io::Error },

    #[error("invalid p-file header: {0}")]
    InvalidHeader(DeserializationError),

    #[error("payload is not a valid compressed stream: {message}")]
    Decompression { message: String },

    #[error("decompressed {actual} bytes, header declares at least {expected}")]
    SizeMismatch { expected: u32, actual: usize },

    #[error("failed to decode p-code: {0}")]
    Decode(DeserializationError),

    #[error("failed to write {}: {source}", path.display())]
    WriteFailure { path: PathBuf, source: io::Error },

    #[error("cancelled by user")]
    Cancelled,

    #[error("an unexpected error has occurred: {message}")]
    Panicked { message: String },
}

/// Process-level outcome of a conversion, as handed back to front ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Success,
    Other,
    InvalidContainer,
    WriteFailure,
    DecompressionFailure,
    Cancelled,
}

impl StatusCode {
    pub fn as_i32(self) -> i32 {
        match self {
            StatusCode::Success => 0,
            StatusCode::Other => 1,
            StatusCode::InvalidContainer => 2,
            StatusCode::WriteFailure => 3,
            StatusCode::DecompressionFailure => 4,
            // 128 + SIGINT
            StatusCode::Cancelled => 130,
        }
    }

    pub fn is_success(self) -> bool {
        self == StatusCode::Success
    }
}

impl PFileError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PFileError::NotFound { .. } | PFileError::InvalidHeader(_) => {
                StatusCode::InvalidContainer
            }
            PFileError::Decompression { .. } | PFileError::SizeMismatch { .. } => {
                StatusCode::DecompressionFailure
            }
            PFileError::Decode(DeserializationError::DecodedBlockTooShort { .. }) => {
                StatusCode::DecompressionFailure
            }
            PFileError::WriteFailure { .. } => StatusCode::WriteFailure,
            PFileError::Cancelled => StatusCode::Cancelled,
            PFileError::FailedToOpenFile { .. }
            | PFileError::Decode(_)
            | PFileError::Panicked { .. } => StatusCode::Other,
        }
    }
}
