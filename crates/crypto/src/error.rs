// Path: crates/crypto/src/error.rs
//! Local error types for the `haven-crypto` crate.

// Re-export the canonical error types from the API crate.
pub use haven_api::error::{CryptoError, PresignError};
