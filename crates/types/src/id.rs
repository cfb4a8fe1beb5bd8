// Path: crates/types/src/id.rs

//! Stable identifiers used throughout the node.
//!
//! Three identifier families exist: `Did` (principals and tenant spaces),
//! `Digest` (self-describing content hashes), and `Link` (content-addressed
//! references to signed structures). All three compare by byte equality of
//! their full encodings.

use crate::error::IdError;
use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The multicodec prefix for an Ed25519 public key (`0xed` as a varint, plus `0x01`).
const ED25519_MULTICODEC_PREFIX: [u8; 2] = [0xed, 0x01];

/// The multihash function code for SHA2-256.
pub const SHA2_256_CODE: u8 = 0x12;
/// The digest length of SHA2-256 in bytes.
pub const SHA2_256_LEN: usize = 32;

/// A decentralized identifier in the `did:key` method.
///
/// A `Did` names either a principal (the node, the upload service, a peer
/// node) or a tenant space. The text form is
/// `did:key:z<base58btc(0xed01 || public-key)>` for Ed25519 keys.
#[derive(Clone, PartialEq, Eq, Hash, Encode, Decode, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Did(String);

impl Did {
    /// Builds the `did:key` identifier for an Ed25519 public key.
    pub fn from_ed25519(public_key: &[u8; 32]) -> Self {
        let mut prefixed = Vec::with_capacity(34);
        prefixed.extend_from_slice(&ED25519_MULTICODEC_PREFIX);
        prefixed.extend_from_slice(public_key);
        Did(format!("did:key:z{}", bs58::encode(prefixed).into_string()))
    }

    /// Parses a DID from its text form, validating the `did:key` shape.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        let Some(rest) = s.strip_prefix("did:key:z") else {
            return Err(IdError::MalformedDid(s.to_string()));
        };
        let bytes = bs58::decode(rest)
            .into_vec()
            .map_err(|e| IdError::MalformedDid(format!("{s}: {e}")))?;
        if bytes.len() != 34 || bytes[..2] != ED25519_MULTICODEC_PREFIX {
            return Err(IdError::MalformedDid(s.to_string()));
        }
        Ok(Did(s.to_string()))
    }

    /// Returns the DID text form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extracts the Ed25519 public key bytes embedded in a `did:key` DID.
    pub fn ed25519_key(&self) -> Result<[u8; 32], IdError> {
        let rest = self
            .0
            .strip_prefix("did:key:z")
            .ok_or_else(|| IdError::MalformedDid(self.0.clone()))?;
        let bytes = bs58::decode(rest)
            .into_vec()
            .map_err(|e| IdError::MalformedDid(format!("{}: {e}", self.0)))?;
        if bytes.len() != 34 || bytes[..2] != ED25519_MULTICODEC_PREFIX {
            return Err(IdError::MalformedDid(self.0.clone()));
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes[2..]);
        Ok(key)
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Did({})", self.0)
    }
}

/// A self-describing content hash (multihash): function code, digest length,
/// digest bytes.
///
/// Only SHA2-256 digests are accepted for new writes; other codes survive
/// decoding so that foreign references can at least be displayed, but every
/// write path rejects them.
#[derive(Clone, PartialEq, Eq, Hash, Encode, Decode)]
pub struct Digest(Vec<u8>);

impl Digest {
    /// Wraps a raw SHA2-256 digest in its multihash encoding.
    pub fn sha2_256(raw: [u8; 32]) -> Self {
        let mut bytes = Vec::with_capacity(2 + SHA2_256_LEN);
        bytes.push(SHA2_256_CODE);
        bytes.push(SHA2_256_LEN as u8);
        bytes.extend_from_slice(&raw);
        Digest(bytes)
    }

    /// Validates and adopts a full multihash encoding.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, IdError> {
        if bytes.len() < 2 {
            return Err(IdError::MalformedDigest("too short".to_string()));
        }
        let len = bytes[1] as usize;
        if bytes.len() != 2 + len {
            return Err(IdError::MalformedDigest(format!(
                "length byte {} does not match payload {}",
                len,
                bytes.len() - 2
            )));
        }
        Ok(Digest(bytes))
    }

    /// The multihash function code. Zero for a truncated encoding, which no
    /// hash function uses.
    pub fn code(&self) -> u8 {
        self.0.first().copied().unwrap_or(0)
    }

    /// True when this digest uses SHA2-256, the only code accepted for writes.
    pub fn is_sha2_256(&self) -> bool {
        self.code() == SHA2_256_CODE && self.raw().len() == SHA2_256_LEN
    }

    /// The digest bytes without the multihash header.
    pub fn raw(&self) -> &[u8] {
        self.0.get(2..).unwrap_or(&[])
    }

    /// The full multihash encoding. Equality of digests is equality of these
    /// bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Parses the `z`-prefixed base58btc text form.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        let Some(rest) = s.strip_prefix('z') else {
            return Err(IdError::MalformedDigest(s.to_string()));
        };
        let bytes = bs58::decode(rest)
            .into_vec()
            .map_err(|e| IdError::MalformedDigest(format!("{s}: {e}")))?;
        Self::from_bytes(bytes)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "z{}", bs58::encode(&self.0).into_string())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({self})")
    }
}

/// A content-addressed reference to a signed structure: the SHA2-256 hash of
/// its canonical encoding.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
pub struct Link(pub [u8; 32]);

impl Link {
    /// Parses the `z`-prefixed base58btc text form.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        let Some(rest) = s.strip_prefix('z') else {
            return Err(IdError::MalformedLink(s.to_string()));
        };
        let bytes = bs58::decode(rest)
            .into_vec()
            .map_err(|e| IdError::MalformedLink(format!("{s}: {e}")))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| IdError::MalformedLink(s.to_string()))?;
        Ok(Link(arr))
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "z{}", bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Link({self})")
    }
}
