// Path: crates/api/src/error.rs
//! Re-exports all core error types from the central `haven-types` crate.
//!
//! Components depend on `haven-api` for their seams; re-exporting the error
//! family here keeps their imports uniform.

pub use haven_types::error::{
    CryptoError, EngineError, ErrorCode, GateError, IdError, PresignError, PublishError,
    ReplicationError, StoreError,
};
