// Path: crates/crypto/src/sign/mod.rs
//! Signature algorithm implementations.

pub mod eddsa;

pub use eddsa::{Ed25519KeyPair, Ed25519PrivateKey, Ed25519PublicKey, Ed25519Signature};
