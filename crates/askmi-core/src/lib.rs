//! Core primitives for the AskMi toolchain.
//!
//! The AskMi contracts store content identifiers as a three field tuple
//! `(digest, hashFunction, size)`. Off-chain, the same identifier travels as a
//! base58 string with the byte layout `[hashFunction:1][size:1][digest:N]`,
//! which is the multihash shape used by content-addressed storage (`Qm...`).
//!
//! * [`multihash`]: the record type, the [`Identifier`] string newtype and the
//!   two conversions between them.
//!
//! Both conversions are pure; the crate holds no state and performs no I/O.

pub mod multihash;

mod error;

pub use error::{CodecError, DecodingError, EncodingError, Field};
pub use multihash::{
    decode_identifier, encode_identifier, Identifier, MultihashRecord, METADATA_LEN, SHA2_256,
};
