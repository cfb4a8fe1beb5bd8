// Path: crates/crypto/src/sign/eddsa/mod.rs
//! Ed25519 signatures using dcrypt.
//!
//! Every principal in the protocol is an Ed25519 key; its DID is the
//! `did:key` form of the public key, so DID resolution is pure key
//! extraction and needs no registry.

use crate::error::CryptoError;
use haven_api::crypto::{SerializableKey, Signature, SigningKey, SigningKeyPair, VerifyingKey};
use haven_types::id::Did;
use rand::rngs::OsRng;

// Import dcrypt Ed25519 module with module qualification
use dcrypt::sign::eddsa;
use dcrypt::Signature as DcryptSignature;

/// Ed25519 key pair implementation
#[derive(Clone)]
pub struct Ed25519KeyPair {
    /// Public verification key
    public_key: eddsa::Ed25519PublicKey,
    /// Private signing key
    secret_key: eddsa::Ed25519SecretKey,
}

/// Ed25519 signature implementation
pub struct Ed25519Signature(eddsa::Ed25519Signature);

/// Ed25519 public key implementation
pub struct Ed25519PublicKey(eddsa::Ed25519PublicKey);

/// Ed25519 private key implementation
pub struct Ed25519PrivateKey(eddsa::Ed25519SecretKey);

impl Ed25519KeyPair {
    /// Generate a new Ed25519 key pair
    pub fn generate() -> Result<Self, CryptoError> {
        let mut rng = OsRng;
        let (public_key, secret_key) = eddsa::Ed25519::keypair(&mut rng)
            .map_err(|e| CryptoError::Backend(e.to_string()))?;
        Ok(Self {
            public_key,
            secret_key,
        })
    }

    /// Rebuild a key pair from a 32-byte seed
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self, CryptoError> {
        let secret_key = eddsa::Ed25519SecretKey::from_seed(seed).map_err(|e| {
            CryptoError::InvalidKey(format!("Failed to create secret key from seed: {e:?}"))
        })?;
        let public_key = secret_key
            .public_key()
            .map_err(|e| CryptoError::InvalidKey(format!("Failed to derive public key: {e:?}")))?;
        Ok(Self {
            public_key,
            secret_key,
        })
    }

    /// The `did:key` identifier of the public key
    pub fn did(&self) -> Result<Did, CryptoError> {
        let bytes: [u8; 32] = self
            .public_key
            .to_bytes()
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("public key was not 32 bytes".to_string()))?;
        Ok(Did::from_ed25519(&bytes))
    }
}

/// Verifies `signature` over `message` against the key embedded in `did`.
pub fn verify_did_signature(did: &Did, message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
    let key_bytes = did
        .ed25519_key()
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    let public_key = Ed25519PublicKey::from_bytes(&key_bytes)?;
    let signature = Ed25519Signature::from_bytes(signature)?;
    public_key.verify(message, &signature)
}

impl SigningKeyPair for Ed25519KeyPair {
    type PublicKey = Ed25519PublicKey;
    type PrivateKey = Ed25519PrivateKey;
    type Signature = Ed25519Signature;

    fn public_key(&self) -> Self::PublicKey {
        Ed25519PublicKey(self.public_key.clone())
    }

    fn private_key(&self) -> Self::PrivateKey {
        Ed25519PrivateKey(self.secret_key.clone())
    }

    fn sign(&self, message: &[u8]) -> Result<Self::Signature, CryptoError> {
        let signature = eddsa::Ed25519::sign(message, &self.secret_key)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;
        Ok(Ed25519Signature(signature))
    }
}

impl VerifyingKey for Ed25519PublicKey {
    type Signature = Ed25519Signature;

    fn verify(&self, message: &[u8], signature: &Self::Signature) -> Result<(), CryptoError> {
        eddsa::Ed25519::verify(message, &signature.0, &self.0)
            .map_err(|_| CryptoError::SignatureInvalid)
    }
}

impl SerializableKey for Ed25519PublicKey {
    fn to_bytes(&self) -> Vec<u8> {
        self.0.to_bytes().to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        eddsa::Ed25519PublicKey::from_bytes(bytes)
            .map(Ed25519PublicKey)
            .map_err(|e| CryptoError::InvalidKey(format!("Failed to parse public key: {e:?}")))
    }
}

impl SigningKey for Ed25519PrivateKey {
    type Signature = Ed25519Signature;

    fn sign(&self, message: &[u8]) -> Result<Self::Signature, CryptoError> {
        let signature = eddsa::Ed25519::sign(message, &self.0)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;
        Ok(Ed25519Signature(signature))
    }
}

impl SerializableKey for Ed25519PrivateKey {
    fn to_bytes(&self) -> Vec<u8> {
        // Export just the seed (32 bytes)
        self.0.seed().to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKey(
                "Invalid private key length: expected 32 bytes".to_string(),
            ));
        }
        let mut seed = [0u8; 32];
        seed.copy_from_slice(bytes);
        eddsa::Ed25519SecretKey::from_seed(&seed)
            .map(Ed25519PrivateKey)
            .map_err(|e| {
                CryptoError::InvalidKey(format!("Failed to create secret key from seed: {e:?}"))
            })
    }
}

impl SerializableKey for Ed25519Signature {
    fn to_bytes(&self) -> Vec<u8> {
        self.0.to_bytes().to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        eddsa::Ed25519Signature::from_bytes(bytes)
            .map(Ed25519Signature)
            .map_err(|_| CryptoError::SignatureInvalid)
    }
}

impl Signature for Ed25519Signature {}

#[cfg(test)]
mod tests;
