// Path: crates/types/src/codec.rs

//! Defines the canonical, deterministic binary codec for all signed and
//! stored state.
//!
//! This module provides simple wrappers around `parity-scale-codec` (SCALE),
//! chosen for its compact and deterministic properties. By centralizing the
//! codec logic here in the base `types` crate, we ensure that every component
//! uses the exact same serialization format for anything that is hashed into
//! a link, signed, or persisted; two encodings of the same value are always
//! byte-identical, which is what makes links and signatures stable.

use parity_scale_codec::{Decode, DecodeAll, Encode};

/// Encodes a value into its canonical byte representation using SCALE.
///
/// Use this for all data that is written to a store, included in a link
/// computation, or covered by a signature.
pub fn to_bytes_canonical<T: Encode>(v: &T) -> Vec<u8> {
    v.encode()
}

/// Decodes a value from its canonical byte representation using SCALE.
///
/// Fails fast on any decoding error, including trailing bytes; malformed
/// input must never be partially accepted on a signed-data path.
pub fn from_bytes_canonical<T: Decode>(b: &[u8]) -> Result<T, String> {
    T::decode_all(&mut &*b).map_err(|e| format!("canonical decode failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{Did, Digest, Link};

    #[derive(Encode, Decode, Debug, PartialEq, Eq)]
    struct Sample {
        space: Did,
        digest: Digest,
        cause: Link,
        size: u64,
    }

    #[test]
    fn canonical_roundtrip() {
        let original = Sample {
            space: Did::from_ed25519(&[1u8; 32]),
            digest: Digest::sha2_256([2u8; 32]),
            cause: Link([3u8; 32]),
            size: 1234,
        };

        let encoded = to_bytes_canonical(&original);
        assert!(!encoded.is_empty());

        let decoded = from_bytes_canonical::<Sample>(&encoded).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn canonical_encoding_is_stable() {
        let a = Digest::sha2_256([9u8; 32]);
        let b = Digest::sha2_256([9u8; 32]);
        assert_eq!(to_bytes_canonical(&a), to_bytes_canonical(&b));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut encoded = to_bytes_canonical(&42u64);
        encoded.push(0);
        assert!(from_bytes_canonical::<u64>(&encoded).is_err());
    }
}
