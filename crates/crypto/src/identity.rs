// Path: crates/crypto/src/identity.rs
//! The node's signing identity.
//!
//! One `NodeIdentity` is constructed at startup from a 32-byte Ed25519 seed
//! and shared read-only by every component that signs: the capability gate
//! (receipts), the accept engine (commitments), the presign authority
//! (tickets), and the replication engine (self-issued transfer invocations).

use crate::error::CryptoError;
use crate::sign::Ed25519KeyPair;
use haven_api::crypto::{NodeSigner, SerializableKey, SigningKeyPair};
use haven_types::id::Did;
use std::path::Path;
use zeroize::Zeroizing;

/// The node's Ed25519 identity and cached DID.
#[derive(Clone)]
pub struct NodeIdentity {
    keypair: Ed25519KeyPair,
    did: Did,
}

impl NodeIdentity {
    /// Builds an identity from a raw 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self, CryptoError> {
        let keypair = Ed25519KeyPair::from_seed(seed)?;
        let did = keypair.did()?;
        Ok(Self { keypair, did })
    }

    /// Generates a fresh identity (tests and first-run tooling).
    pub fn generate() -> Result<Self, CryptoError> {
        let keypair = Ed25519KeyPair::generate()?;
        let did = keypair.did()?;
        Ok(Self { keypair, did })
    }

    /// Loads the hex-encoded 32-byte seed from a key file.
    pub fn load(path: &Path) -> Result<Self, CryptoError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CryptoError::InvalidKey(format!("read {}: {e}", path.display())))?;
        let bytes = Zeroizing::new(
            hex::decode(text.trim())
                .map_err(|e| CryptoError::InvalidKey(format!("decode {}: {e}", path.display())))?,
        );
        let seed: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("key file must hold 32 hex bytes".to_string()))?;
        Self::from_seed(&seed)
    }

    /// The node's public key bytes.
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.keypair.public_key().to_bytes()
    }
}

impl NodeSigner for NodeIdentity {
    fn did(&self) -> &Did {
        &self.did
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(self.keypair.sign(message)?.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sign::eddsa::verify_did_signature;
    use std::io::Write;

    #[test]
    fn load_roundtrips_through_a_key_file() {
        let identity = NodeIdentity::generate().unwrap();
        let seed = identity.keypair.private_key().to_bytes();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", hex::encode(&seed)).unwrap();

        let loaded = NodeIdentity::load(file.path()).unwrap();
        assert_eq!(loaded.did(), identity.did());
    }

    #[test]
    fn signatures_verify_against_the_did() {
        let identity = NodeIdentity::generate().unwrap();
        let sig = identity.sign(b"receipt body").unwrap();
        assert!(verify_did_signature(identity.did(), b"receipt body", &sig).is_ok());
    }
}
