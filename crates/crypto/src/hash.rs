// Path: crates/crypto/src/hash.rs
//! Cryptographic hash functions using dcrypt.

use crate::error::CryptoError;
use dcrypt::algorithms::hash::sha2::Sha256 as DcryptSha256;
use dcrypt::algorithms::hash::HashFunction as DcryptHashFunction;
use dcrypt::algorithms::ByteSerializable;
use haven_types::codec;
use haven_types::id::{Digest, Link};
use parity_scale_codec::Encode;

/// SHA2-256 of a message.
pub fn sha2_256(message: &[u8]) -> Result<[u8; 32], CryptoError> {
    // Map the specific algorithm error to the general `dcrypt::Error` to
    // resolve the ambiguity for the `?` operator.
    let digest = DcryptSha256::digest(message)
        .map_err(dcrypt::Error::from)
        .map_err(|e| CryptoError::Backend(e.to_string()))?;
    let bytes = digest.to_bytes();
    let arr: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::Backend("SHA-256 digest was not 32 bytes".to_string()))?;
    Ok(arr)
}

/// The multihash digest of a byte body, as used to key the blob store.
pub fn digest_of(body: &[u8]) -> Result<Digest, CryptoError> {
    Ok(Digest::sha2_256(sha2_256(body)?))
}

/// The link of a signed structure: SHA2-256 of its canonical encoding.
pub fn link_of<T: Encode>(value: &T) -> Result<Link, CryptoError> {
    Ok(Link(sha2_256(&codec::to_bytes_canonical(value))?))
}
