//! Multihash records and their base58 identifiers.
//!
//! On-chain an identifier is the tuple `(digest, hashFunction, size)`, with the
//! two header fields held as 256-bit integers because that is what the contract
//! ABI returns. Off-chain it is the base58 encoding of
//! `[hashFunction:1][size:1][digest:N]`. Unlike IPFS multihashes the header is
//! two plain bytes rather than varints, so both header fields are capped at 255.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::{Bytes, U256};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{DecodingError, EncodingError, Field};

/// Multihash code for SHA2-256.
pub const SHA2_256: u8 = 0x12;

/// Header bytes preceding the digest: hash function code and size.
pub const METADATA_LEN: usize = 2;

/// The on-chain shape of a content identifier.
///
/// Field names serialize as the contract ABI spells them (`hashFunction`), so
/// a record can be read straight out of a contract call result.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct MultihashRecord {
    pub digest: Bytes,
    pub hash_function: U256,
    pub size: U256,
}

impl MultihashRecord {
    /// Wrap a digest produced by the hash function `code`.
    pub fn new(code: u8, digest: impl Into<Bytes>) -> Result<Self, EncodingError> {
        let digest = digest.into();
        let size = U256::from(digest.len());
        if digest.len() > u8::MAX as usize {
            return Err(EncodingError::FieldOutOfRange {
                field: Field::Size,
                value: size,
            });
        }
        Ok(Self {
            digest,
            hash_function: U256::from(code),
            size,
        })
    }

    /// Hash `content` with SHA2-256 and wrap the result.
    pub fn sha2_256(content: impl AsRef<[u8]>) -> Self {
        let digest: [u8; 32] = Sha256::digest(content.as_ref()).into();
        Self {
            digest: Bytes::copy_from_slice(&digest),
            hash_function: U256::from(SHA2_256),
            size: U256::from(digest.len()),
        }
    }

    /// Build a record from contract-style fields where the digest is 0x-prefixed hex.
    pub fn from_hex(
        digest: &str,
        hash_function: U256,
        size: U256,
    ) -> Result<Self, hex::FromHexError> {
        let digest = digest.trim();
        let digest = digest.strip_prefix("0x").unwrap_or(digest);
        Ok(Self {
            digest: Bytes::from(hex::decode(digest)?),
            hash_function,
            size,
        })
    }

    /// The unpopulated slot: a record with size zero.
    pub fn absent() -> Self {
        Self::default()
    }

    /// Whether this record is the "no identifier" sentinel.
    pub fn is_absent(&self) -> bool {
        self.size.is_zero()
    }

    /// Digest rendered as 0x-prefixed lowercase hex, the format contract calls expect.
    pub fn digest_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.digest))
    }

    /// Check that the record fits the two-byte header layout and is self-consistent.
    pub fn validate(&self) -> Result<(), EncodingError> {
        self.header().map(|_| ())
    }

    /// Raw multihash bytes: header followed by the digest.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodingError> {
        let header = self.header()?;
        let mut bytes = Vec::with_capacity(METADATA_LEN + self.digest.len());
        bytes.extend_from_slice(&header);
        bytes.extend_from_slice(&self.digest);
        Ok(bytes)
    }

    fn header(&self) -> Result<[u8; METADATA_LEN], EncodingError> {
        let code = single_byte(Field::HashFunction, self.hash_function)?;
        let size = single_byte(Field::Size, self.size)?;
        if size as usize != self.digest.len() {
            return Err(EncodingError::SizeMismatch {
                declared: self.size,
                actual: self.digest.len(),
            });
        }
        Ok([code, size])
    }
}

fn single_byte(field: Field, value: U256) -> Result<u8, EncodingError> {
    u8::try_from(value).map_err(|_| EncodingError::FieldOutOfRange { field, value })
}

/// A base58 encoded multihash, e.g. `QmZtnFaddFtzGNT8BxdHVbQrhSFdq1pWxud5z4fA4kxfDt`.
///
/// Values are only produced by [`encode_identifier`] or by parsing, so every
/// `Identifier` decodes to at least the two header bytes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Decode back into the on-chain record.
    pub fn record(&self) -> Result<MultihashRecord, DecodingError> {
        decode_identifier(&self.0)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for Identifier {
    type Err = DecodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_identifier(s)?;
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for Identifier {
    type Error = DecodingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        decode_identifier(&value)?;
        Ok(Self(value))
    }
}

impl From<Identifier> for String {
    fn from(value: Identifier) -> Self {
        value.0
    }
}

/// Encode an on-chain record as a base58 identifier.
///
/// Returns `Ok(None)` for a record of size zero, whatever its other fields
/// hold: the contract slot has not been populated yet.
pub fn encode_identifier(record: &MultihashRecord) -> Result<Option<Identifier>, EncodingError> {
    if record.is_absent() {
        return Ok(None);
    }
    let bytes = record.to_bytes()?;
    Ok(Some(Identifier(bs58::encode(bytes).into_string())))
}

/// Split a base58 identifier into its on-chain record.
///
/// The size byte is taken as given; use [`MultihashRecord::validate`] to check
/// it against the digest length.
pub fn decode_identifier(text: &str) -> Result<MultihashRecord, DecodingError> {
    let decoded = bs58::decode(text).into_vec()?;
    if decoded.len() < METADATA_LEN {
        return Err(DecodingError::TooShort { len: decoded.len() });
    }
    Ok(MultihashRecord {
        digest: Bytes::copy_from_slice(&decoded[METADATA_LEN..]),
        hash_function: U256::from(decoded[0]),
        size: U256::from(decoded[1]),
    })
}
