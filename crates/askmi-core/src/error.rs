use alloy_primitives::U256;
use thiserror::Error;

/// Single-byte header field of the identifier layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    HashFunction,
    Size,
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Field::HashFunction => write!(f, "hash function"),
            Field::Size => write!(f, "size"),
        }
    }
}

/// A record that cannot be laid out as `[code:1][size:1][digest:N]`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodingError {
    /// Header field does not fit in one byte.
    #[error("{field} {value} does not fit in a single byte")]
    FieldOutOfRange { field: Field, value: U256 },

    /// Declared size disagrees with the digest actually supplied.
    #[error("declared size {declared} does not match digest length {actual}")]
    SizeMismatch { declared: U256, actual: usize },
}

/// Externally supplied identifier text that cannot be turned into a record.
#[derive(Debug, Error)]
pub enum DecodingError {
    #[error("invalid base58: {0}")]
    InvalidBase58(#[from] bs58::decode::Error),

    #[error("identifier decodes to {len} bytes, at least 2 are required")]
    TooShort { len: usize },
}

/// Canonical error type for callers that handle both directions.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    Decoding(#[from] DecodingError),
}
